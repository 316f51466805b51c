use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;

static CACHE_DIR: LazyLock<CacheDir> = LazyLock::new(|| {
    let proj_dirs = ProjectDirs::from("", "", "imfind").expect("failed to get project dir");
    CacheDir { path: proj_dirs.cache_dir().to_path_buf() }
});

fn default_cache_dir() -> &'static str {
    CACHE_DIR.path().to_str().unwrap()
}

#[derive(Parser, Debug, Clone)]
pub struct EmbedOptions {
    /// embedding 服务地址，需要兼容 OpenAI embeddings API
    #[arg(long, value_name = "URL", default_value = "http://127.0.0.1:8100/v1")]
    pub embedder_url: String,
    /// embedding 模型名称
    #[arg(long, value_name = "NAME", default_value = "ViT-B-32")]
    pub embedder_model: String,
    /// embedding 服务的 API key
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,
    /// 并发 embedding 请求数量，默认为 CPU 核心数
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,
}

impl EmbedOptions {
    pub fn jobs(&self) -> usize {
        self.jobs.unwrap_or_else(num_cpus::get)
    }
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 显示的结果数量
    #[arg(short = 'k', long, value_name = "COUNT", default_value_t = 10)]
    pub count: usize,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "imfind", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// imfind 缓存目录
    #[arg(short, long, default_value = default_cache_dir())]
    pub cache_dir: CacheDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 索引目录中的图片，并缓存 embedding
    Index(IndexCommand),
    /// 索引目录后使用自然语言搜索图片
    Search(SearchCommand),
    /// 索引目录后启动 HTTP 搜索服务
    Server(ServerCommand),
}

#[derive(Debug, Clone)]
pub struct CacheDir {
    path: PathBuf,
}

impl CacheDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回 embedding 缓存数据库的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("embeddings.db")
    }
}

impl FromStr for CacheDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}
