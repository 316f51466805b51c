use indicatif::ProgressStyle;
use regex::Regex;

/// 返回默认的进度条样式
pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .unwrap()
        .progress_chars("#>-")
}

/// 根据逗号分隔的后缀列表构建大小写不敏感的后缀匹配正则
pub fn suffix_regex(suffix: &str) -> Regex {
    let re = format!("(?i)^({})$", suffix.replace(',', "|"));
    Regex::new(&re).expect("failed to build regex")
}
