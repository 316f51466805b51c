use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use anyhow::{Result, bail};
use futures::StreamExt;
use indicatif::{ParallelProgressIterator, ProgressBar};
use log::info;
use rayon::prelude::*;
use regex::Regex;
use tokio::task::block_in_place;
use walkdir::WalkDir;

use crate::Session;
use crate::cache::EmbeddingCache;
use crate::embed::Embedding;
use crate::utils::{pb_style, suffix_regex};

/// 单张图片被跳过的原因
#[derive(Debug, Clone)]
pub enum SkipReason {
    /// 文件读取失败
    Unreadable(String),
    /// embedding 计算失败
    EmbedFailed(String),
    /// 向量维度与索引不一致
    DimensionMismatch(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unreadable(e) => write!(f, "读取失败: {e}"),
            SkipReason::EmbedFailed(e) => write!(f, "计算 embedding 失败: {e}"),
            SkipReason::DimensionMismatch(e) => write!(f, "{e}"),
        }
    }
}

/// 被跳过的图片记录
#[derive(Debug)]
pub struct SkipRecord {
    pub path: String,
    pub reason: SkipReason,
}

/// 一次索引运行的结果汇总
#[derive(Debug, Default)]
pub struct IndexSummary {
    /// 成功加入索引的图片数量
    pub indexed: usize,
    /// 被跳过的图片及原因
    pub skipped: Vec<SkipRecord>,
}

/// 索引目录下的所有图片
///
/// 分为四轮执行：扫描目录、计算内容摘要、检查缓存、计算缺失的 embedding。
/// 摘要相同的文件共享一次 embedding 计算；单张图片的失败只影响该图片，
/// 其余图片继续处理。
pub async fn index_directory(
    session: &Session,
    path: &Path,
    suffix: &str,
    jobs: usize,
) -> Result<IndexSummary> {
    if !path.is_dir() {
        bail!("目录不存在: {}", path.display());
    }
    let re_suf = suffix_regex(suffix);
    let mut summary = IndexSummary::default();

    // 扫描目录
    info!("开始扫描目录: {}", path.display());
    let entries = scan_directory(path, &re_suf);
    info!("扫描完成，共 {} 张图片", entries.len());

    // NOTE: 由于异步 + rayon 的组合实在麻烦，这里将计算拆分为多轮，
    // 避免在异步上下文中使用 rayon
    let hashed = block_in_place(|| {
        let pb = ProgressBar::new(entries.len() as u64)
            .with_style(pb_style())
            .with_message("计算图片哈希中...");
        entries
            .into_par_iter()
            .progress_with(pb)
            .map(|entry| {
                let digest = std::fs::read(&entry).map(|data| EmbeddingCache::digest(&data));
                (entry, digest)
            })
            .collect::<Vec<_>>()
    });

    let mut groups: HashMap<blake3::Hash, Vec<String>> = HashMap::new();
    for (entry, digest) in hashed {
        match digest {
            Ok(digest) => groups.entry(digest).or_default().push(entry),
            Err(e) => summary
                .skipped
                .push(SkipRecord { path: entry, reason: SkipReason::Unreadable(e.to_string()) }),
        }
    }
    info!("计算哈希值完成，共 {} 张不重复图片", groups.len());

    // 检查缓存，命中的摘要直接入索引
    let pb = ProgressBar::new(groups.len() as u64)
        .with_style(pb_style())
        .with_message("检查缓存中...");
    let mut pending = vec![];
    for (digest, paths) in groups {
        match session.lookup(&digest).await {
            Some(embedding) => insert_all(session, paths, &embedding, &mut summary),
            None => pending.push((digest, paths)),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    info!("检查缓存完成，共 {} 张新图片", pending.len());

    // 计算缺失的 embedding，成功的写回缓存并入索引
    let pb = ProgressBar::new(pending.len() as u64)
        .with_style(pb_style())
        .with_message("计算 embedding 中...");
    let outcomes = futures::stream::iter(pending)
        .map(|(digest, paths)| {
            let pb = pb.clone();
            async move {
                let result = read_and_embed(session, &paths[0]).await;
                if let Ok(embedding) = &result {
                    session.remember(&digest, embedding).await;
                }
                pb.inc(1);
                (paths, result)
            }
        })
        .buffer_unordered(jobs.max(1))
        .collect::<Vec<_>>()
        .await;
    pb.finish_with_message("embedding 计算完成");

    for (paths, result) in outcomes {
        match result {
            Ok(embedding) => insert_all(session, paths, &embedding, &mut summary),
            Err(reason) => {
                for path in paths {
                    summary.skipped.push(SkipRecord { path, reason: reason.clone() });
                }
            }
        }
    }

    // 跳过列表按路径排序，保证多次运行输出一致
    summary.skipped.sort_by(|a, b| a.path.cmp(&b.path));
    info!("索引完成: {} 张图片加入索引, {} 张被跳过", summary.indexed, summary.skipped.len());

    Ok(summary)
}

/// 将一组摘要相同的图片逐个加入索引
fn insert_all(
    session: &Session,
    paths: Vec<String>,
    embedding: &Embedding,
    summary: &mut IndexSummary,
) {
    for path in paths {
        match session.insert(&path, embedding.clone()) {
            Ok(()) => summary.indexed += 1,
            Err(e) => summary
                .skipped
                .push(SkipRecord { path, reason: SkipReason::DimensionMismatch(e.to_string()) }),
        }
    }
}

async fn read_and_embed(session: &Session, path: &str) -> Result<Embedding, SkipReason> {
    let data =
        tokio::fs::read(path).await.map_err(|e| SkipReason::Unreadable(e.to_string()))?;
    session.embed_image(&data).await.map_err(|e| SkipReason::EmbedFailed(e.to_string()))
}

fn scan_directory(path: &Path, re_suf: &Regex) -> Vec<String> {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| {
            entry.ok().and_then(|entry| {
                let path = entry.path();
                if path.is_file() {
                    if let Some(ext) = path.extension() {
                        if re_suf.is_match(&ext.to_string_lossy()) {
                            return Some(path.to_string_lossy().to_string());
                        }
                    }
                }
                None
            })
        })
        .collect()
}
