use anyhow::Result;
use log::{info, warn};
use sqlx::{Row, SqlitePool, sqlite::*};

use crate::config::CacheDir;
use crate::embed::Embedding;

/// 以内容摘要为键的 embedding 持久化缓存
///
/// 同一内容的 embedding 只计算一次，跨进程复用。记录一旦写入就不再修改，
/// 核心范围内也没有删除操作。
pub struct EmbeddingCache {
    pool: SqlitePool,
}

impl EmbeddingCache {
    /// 打开或创建缓存数据库
    ///
    /// 缓存目录不可用属于致命错误，直接上抛。
    pub async fn open(cache_dir: &CacheDir) -> Result<Self> {
        std::fs::create_dir_all(cache_dir.path())?;

        let filename = cache_dir.database();
        info!("初始化 embedding 缓存: {}", filename.display());

        let options = SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .filename(&filename)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS embedding (
                digest BLOB PRIMARY KEY,
                vector BLOB NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// 计算文件内容的摘要，作为缓存键
    pub fn digest(bytes: &[u8]) -> blake3::Hash {
        blake3::hash(bytes)
    }

    /// 查询摘要对应的 embedding，未命中时返回 None
    ///
    /// 读取失败同样视为未命中，上层重新计算即可，不影响正确性。
    pub async fn lookup(&self, digest: &blake3::Hash) -> Option<Embedding> {
        let row = sqlx::query("SELECT vector FROM embedding WHERE digest = ?")
            .bind(digest.as_bytes().as_slice())
            .fetch_optional(&self.pool)
            .await;
        let row = match row {
            Ok(row) => row?,
            Err(e) => {
                warn!("读取缓存失败: {e}");
                return None;
            }
        };

        let blob: Vec<u8> = row.get("vector");
        match bincode::deserialize(&blob) {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!("缓存记录损坏: {e}");
                None
            }
        }
    }

    /// 写入摘要对应的 embedding
    ///
    /// 重复写入同一摘要是幂等的，已有记录不会被覆盖。
    /// 写入失败只会导致下次运行重新计算，因此只记录日志，不上抛。
    pub async fn store(&self, digest: &blake3::Hash, vector: &[f32]) {
        let blob = match bincode::serialize(vector) {
            Ok(blob) => blob,
            Err(e) => {
                warn!("序列化 embedding 失败: {e}");
                return;
            }
        };

        let result = sqlx::query(
            "INSERT INTO embedding (digest, vector) VALUES (?, ?) ON CONFLICT(digest) DO NOTHING",
        )
        .bind(digest.as_bytes().as_slice())
        .bind(blob)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!("写入缓存失败: {e}");
        }
    }

    /// 查询缓存中的记录数量
    pub async fn count(&self) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM embedding").fetch_one(&self.pool).await?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn cache_dir(tmp: &tempfile::TempDir) -> CacheDir {
        CacheDir::from_str(tmp.path().to_str().unwrap()).unwrap()
    }

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(EmbeddingCache::digest(b"hello"), EmbeddingCache::digest(b"hello"));
        assert_ne!(EmbeddingCache::digest(b"hello"), EmbeddingCache::digest(b"world"));
    }

    #[tokio::test]
    async fn store_then_lookup_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = EmbeddingCache::open(&cache_dir(&tmp)).await.unwrap();

        let digest = EmbeddingCache::digest(b"some image");
        let vector = vec![0.25, -1.5, 3.0];

        assert_eq!(cache.lookup(&digest).await, None);
        cache.store(&digest, &vector).await;
        assert_eq!(cache.lookup(&digest).await, Some(vector));
        assert_eq!(cache.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn store_is_idempotent_and_never_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = EmbeddingCache::open(&cache_dir(&tmp)).await.unwrap();

        let digest = EmbeddingCache::digest(b"some image");
        cache.store(&digest, &[1.0, 2.0]).await;
        cache.store(&digest, &[1.0, 2.0]).await;
        cache.store(&digest, &[9.0, 9.0]).await;

        assert_eq!(cache.count().await.unwrap(), 1);
        assert_eq!(cache.lookup(&digest).await, Some(vec![1.0, 2.0]));
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let digest = EmbeddingCache::digest(b"some image");

        {
            let cache = EmbeddingCache::open(&cache_dir(&tmp)).await.unwrap();
            cache.store(&digest, &[0.5, 0.5]).await;
        }

        let cache = EmbeddingCache::open(&cache_dir(&tmp)).await.unwrap();
        assert_eq!(cache.lookup(&digest).await, Some(vec![0.5, 0.5]));
    }
}
