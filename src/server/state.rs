use std::sync::Arc;

use crate::Session;
use crate::cli::server::ServerCommand;
use crate::config::SearchOptions;

/// 应用状态
pub struct AppState {
    /// 搜索会话，索引在启动时构建完成
    pub session: Session,
    /// 搜索配置选项
    pub search: SearchOptions,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(session: Session, opts: &ServerCommand) -> Arc<Self> {
        Arc::new(AppState { session, search: opts.search.clone() })
    }
}
