use std::collections::BTreeMap;
use std::sync::RwLock;

use thiserror::Error;

use crate::embed::Embedding;

#[derive(Debug, Error)]
pub enum IndexError {
    /// 向量维度与索引不一致
    #[error("向量维度不匹配: 期望 {expected}, 实际 {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// 内存中的向量相似度索引
///
/// 保存一次索引会话中的所有 (路径, embedding) 记录，查询时对全部记录做
/// 精确线性扫描。索引不落盘，每次运行从缓存和新计算的 embedding 重建。
///
/// 距离固定为余弦距离：所有向量在插入时统一做 L2 归一化，查询向量在
/// 比较前做同样处理，距离即 `1 - dot(a, b)`。
pub struct SimilarityIndex {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    /// 首次插入时确定的向量维度
    dim: Option<usize>,
    entries: BTreeMap<String, Embedding>,
}

impl SimilarityIndex {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Inner::default()) }
    }

    /// 插入或替换一条记录
    ///
    /// 首次插入确定索引的向量维度，之后维度不一致的插入会被拒绝。
    pub fn insert(
        &self,
        id: impl Into<String>,
        mut embedding: Embedding,
    ) -> Result<(), IndexError> {
        let mut inner = self.inner.write().expect("failed to acquire rw lock");
        match inner.dim {
            Some(dim) if dim != embedding.len() => {
                return Err(IndexError::DimensionMismatch {
                    expected: dim,
                    actual: embedding.len(),
                });
            }
            None => inner.dim = Some(embedding.len()),
            _ => {}
        }
        normalize(&mut embedding);
        inner.entries.insert(id.into(), embedding);
        Ok(())
    }

    /// 查询与 query 最接近的 k 条记录，返回 (余弦距离, 路径)，按距离升序
    ///
    /// 距离相同时按路径字典序排序，保证结果确定性；
    /// k 超过记录总数时返回全部记录。
    pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<(f32, String)>, IndexError> {
        let inner = self.inner.read().expect("failed to acquire rw lock");
        let Some(dim) = inner.dim else {
            return Ok(vec![]);
        };
        if query.len() != dim {
            return Err(IndexError::DimensionMismatch { expected: dim, actual: query.len() });
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut results = inner
            .entries
            .iter()
            .map(|(id, embedding)| (1. - dot(&query, embedding), id.clone()))
            .collect::<Vec<_>>();
        results.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        results.truncate(k);

        Ok(results)
    }

    /// 索引中的记录数量
    pub fn len(&self) -> usize {
        self.inner.read().expect("failed to acquire rw lock").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 导出所有记录，embedding 为归一化后的值
    pub fn export(&self) -> Vec<(String, Embedding)> {
        let inner = self.inner.read().expect("failed to acquire rw lock");
        inner.entries.iter().map(|(id, embedding)| (id.clone(), embedding.clone())).collect()
    }
}

impl Default for SimilarityIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0. {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_orders_by_ascending_distance() {
        let index = SimilarityIndex::new();
        index.insert("a", vec![1.0, 0.0]).unwrap();
        index.insert("b", vec![0.0, 1.0]).unwrap();
        index.insert("c", vec![0.7, 0.7]).unwrap();

        let results = index.query(&[1.0, 0.0], 3).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].1, "a");
        assert!(results[0].0 <= results[1].0);
        assert!(results[1].0 <= results[2].0);
    }

    #[test]
    fn equal_distances_break_ties_by_identifier() {
        // 余弦距离依次为 0.1 / 0.2 / 0.2 / 0.5 / 0.9
        let index = SimilarityIndex::new();
        index.insert("d", vec![0.5, 0.75f32.sqrt()]).unwrap();
        index.insert("c", vec![0.8, 0.6]).unwrap();
        index.insert("e", vec![0.1, 0.99f32.sqrt()]).unwrap();
        index.insert("b", vec![0.8, 0.6]).unwrap();
        index.insert("a", vec![0.9, 0.19f32.sqrt()]).unwrap();

        let results = index.query(&[1.0, 0.0], 3).unwrap();
        let ids = results.iter().map(|(_, id)| id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(results[1].0, results[2].0);
    }

    #[test]
    fn k_larger_than_len_returns_everything() {
        let index = SimilarityIndex::new();
        index.insert("a", vec![1.0, 0.0]).unwrap();
        index.insert("b", vec![0.0, 1.0]).unwrap();

        let results = index.query(&[1.0, 0.0], 100).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn query_on_empty_index_returns_nothing() {
        let index = SimilarityIndex::new();
        assert_eq!(index.query(&[1.0, 0.0], 10).unwrap(), vec![]);
    }

    #[test]
    fn insert_replaces_existing_identifier() {
        let index = SimilarityIndex::new();
        index.insert("a", vec![1.0, 0.0]).unwrap();
        index.insert("a", vec![0.0, 1.0]).unwrap();

        assert_eq!(index.len(), 1);
        let results = index.query(&[0.0, 1.0], 1).unwrap();
        assert!(results[0].0 < 1e-6);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let index = SimilarityIndex::new();
        index.insert("a", vec![1.0, 0.0, 0.0]).unwrap();

        let err = index.insert("b", vec![1.0, 0.0]).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 3, actual: 2 }));
        assert!(index.query(&[1.0, 0.0], 1).is_err());
    }

    #[test]
    fn distance_ignores_vector_scale() {
        let index = SimilarityIndex::new();
        index.insert("a", vec![10.0, 0.0]).unwrap();

        let results = index.query(&[0.1, 0.0], 1).unwrap();
        assert!(results[0].0 < 1e-6);
    }

    #[test]
    fn concurrent_inserts_of_distinct_identifiers() {
        let index = SimilarityIndex::new();
        std::thread::scope(|s| {
            for i in 0..8 {
                let index = &index;
                s.spawn(move || {
                    for j in 0..16 {
                        index.insert(format!("{i}-{j}"), vec![i as f32, j as f32]).unwrap();
                    }
                });
            }
        });
        assert_eq!(index.len(), 128);
    }
}
