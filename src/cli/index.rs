use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{info, warn};

use crate::Session;
use crate::cli::SubCommandExtend;
use crate::config::{EmbedOptions, Opts};
use crate::embed::ClipClient;
use crate::indexer::index_directory;

#[derive(Parser, Debug, Clone)]
pub struct IndexCommand {
    #[command(flatten)]
    pub embed: EmbedOptions,
    /// 图片所在目录
    pub path: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,jpeg,png")]
    pub suffix: String,
}

impl SubCommandExtend for IndexCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let embedder = Arc::new(ClipClient::from(&self.embed));
        let session = Session::open(&opts.cache_dir, embedder).await?;

        let summary = index_directory(&session, &self.path, &self.suffix, self.embed.jobs()).await?;
        for skip in &summary.skipped {
            warn!("跳过 {}: {}", skip.path, skip.reason);
        }
        info!("缓存中共 {} 条记录", session.cached_count().await?);

        println!("索引完成: {} 张图片, 跳过 {} 张", summary.indexed, summary.skipped.len());
        Ok(())
    }
}
