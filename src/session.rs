use std::sync::Arc;

use anyhow::Result;
use log::debug;

use crate::cache::EmbeddingCache;
use crate::config::CacheDir;
use crate::embed::{EmbedError, Embedder, Embedding};
use crate::index::{IndexError, SimilarityIndex};

/// 一次搜索会话的上下文，持有缓存、索引和 embedding 客户端
///
/// 所有组件都通过该结构显式构造和传递，不存在进程级单例。
/// 索引内容只在会话内有效，缓存则跨会话复用。
pub struct Session {
    cache: EmbeddingCache,
    index: SimilarityIndex,
    embedder: Arc<dyn Embedder>,
}

impl Session {
    /// 打开一个新的搜索会话
    pub async fn open(cache_dir: &CacheDir, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let cache = EmbeddingCache::open(cache_dir).await?;
        Ok(Self { cache, index: SimilarityIndex::new(), embedder })
    }

    /// 查询缓存中摘要对应的 embedding
    pub async fn lookup(&self, digest: &blake3::Hash) -> Option<Embedding> {
        self.cache.lookup(digest).await
    }

    /// 将新计算的 embedding 写回缓存
    pub async fn remember(&self, digest: &blake3::Hash, embedding: &[f32]) {
        self.cache.store(digest, embedding).await
    }

    /// 将图片加入相似度索引
    pub fn insert(&self, path: impl Into<String>, embedding: Embedding) -> Result<(), IndexError> {
        self.index.insert(path, embedding)
    }

    /// 计算图片内容的 embedding
    pub async fn embed_image(&self, bytes: &[u8]) -> Result<Embedding, EmbedError> {
        self.embedder.embed_image(bytes).await
    }

    /// 使用自然语言查询索引，返回 (余弦距离, 图片路径)，按距离升序
    pub async fn search(&self, query: &str, count: usize) -> Result<Vec<(f32, String)>> {
        debug!("searching {} nearest neighbors", count);
        let embedding = self.embedder.embed_text(query).await?;
        Ok(self.index.query(&embedding, count)?)
    }

    /// 索引中的图片数量
    pub fn indexed_len(&self) -> usize {
        self.index.len()
    }

    /// 缓存中的记录数量
    pub async fn cached_count(&self) -> Result<u64> {
        self.cache.count().await
    }

    /// 导出索引内容，embedding 为归一化后的值
    pub fn export(&self) -> Vec<(String, Embedding)> {
        self.index.export()
    }
}
