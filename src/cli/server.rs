use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{info, warn};
use tokio::net::TcpListener;

use crate::cli::SubCommandExtend;
use crate::config::{EmbedOptions, Opts, SearchOptions};
use crate::embed::ClipClient;
use crate::indexer::index_directory;
use crate::{Session, server};

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    #[command(flatten)]
    pub embed: EmbedOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 图片所在目录
    pub path: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,jpeg,png")]
    pub suffix: String,
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub addr: String,
}

impl SubCommandExtend for ServerCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let embedder = Arc::new(ClipClient::from(&self.embed));
        let session = Session::open(&opts.cache_dir, embedder).await?;

        let summary = index_directory(&session, &self.path, &self.suffix, self.embed.jobs()).await?;
        for skip in &summary.skipped {
            warn!("跳过 {}: {}", skip.path, skip.reason);
        }
        info!("共索引 {} 张图片", session.indexed_len());

        // 创建应用状态
        let state = server::AppState::new(session, self);

        // 创建应用
        let app = server::create_app(state);

        // 启动服务器
        info!("服务器启动：http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
