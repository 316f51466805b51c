use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::warn;

use crate::Session;
use crate::cli::SubCommandExtend;
use crate::config::{EmbedOptions, Opts, SearchOptions};
use crate::embed::ClipClient;
use crate::indexer::index_directory;

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub embed: EmbedOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 图片所在目录
    pub path: PathBuf,
    /// 查询文本，例如 "a photo of a cat"
    pub query: String,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,jpeg,png")]
    pub suffix: String,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let embedder = Arc::new(ClipClient::from(&self.embed));
        let session = Session::open(&opts.cache_dir, embedder).await?;

        let summary = index_directory(&session, &self.path, &self.suffix, self.embed.jobs()).await?;
        for skip in &summary.skipped {
            warn!("跳过 {}: {}", skip.path, skip.reason);
        }

        let result = session.search(&self.query, self.search.count).await?;
        print_result(&result, self)
    }
}

fn print_result(result: &[(f32, String)], opts: &SearchCommand) -> Result<()> {
    match opts.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            for (k, v) in result {
                println!("{:.2}\t{}", k, v);
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone)]
pub enum OutputFormat {
    Json,
    Table,
}
