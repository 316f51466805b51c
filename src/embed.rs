use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::debug;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::config::EmbedOptions;

/// 图片或文本在共享向量空间中的 embedding
pub type Embedding = Vec<f32>;

#[derive(Debug, Error)]
pub enum EmbedError {
    /// 请求发送失败
    #[error("embedding 请求失败: {0}")]
    Request(#[from] reqwest::Error),
    /// 服务端返回错误状态
    #[error("embedding 服务返回 {status}: {body}")]
    Api { status: u16, body: String },
    /// 响应解析失败
    #[error("embedding 响应格式错误: {0}")]
    InvalidResponse(String),
}

/// embedding 模型的抽象接口
///
/// 图片和文本必须被映射到同一个向量空间，且对相同输入保持确定性。
#[async_trait]
pub trait Embedder: Send + Sync {
    /// 计算图片内容的 embedding
    async fn embed_image(&self, bytes: &[u8]) -> Result<Embedding, EmbedError>;
    /// 计算查询文本的 embedding
    async fn embed_text(&self, text: &str) -> Result<Embedding, EmbedError>;
}

/// 通过 OpenAI 兼容的 embeddings 接口访问 CLIP 类模型
///
/// 文本直接作为 input 发送，图片编码为 `data:` base64 URL。
pub struct ClipClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl ClipClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    async fn request(&self, input: String) -> Result<Embedding, EmbedError> {
        let body = json!({
            "input": input,
            "model": self.model,
        });

        let mut request = self.client.post(format!("{}/embeddings", self.base_url)).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Api { status: status.as_u16(), body });
        }

        let response: EmbeddingResponse = response.json().await?;
        let embedding = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::InvalidResponse("响应中缺少 embedding".to_string()))?
            .embedding;
        debug!("embedding dimension: {}", embedding.len());

        Ok(embedding)
    }
}

impl From<&EmbedOptions> for ClipClient {
    fn from(opts: &EmbedOptions) -> Self {
        let client = ClipClient::new(&opts.embedder_url, &opts.embedder_model);
        match &opts.api_key {
            Some(key) => client.with_api_key(key),
            None => client,
        }
    }
}

#[async_trait]
impl Embedder for ClipClient {
    async fn embed_image(&self, bytes: &[u8]) -> Result<Embedding, EmbedError> {
        let input = format!("data:{};base64,{}", sniff_mime(bytes), STANDARD.encode(bytes));
        self.request(input).await
    }

    async fn embed_text(&self, text: &str) -> Result<Embedding, EmbedError> {
        self.request(text.to_string()).await
    }
}

/// 根据文件头猜测图片的 MIME 类型
fn sniff_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) { "image/png" } else { "image/jpeg" }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Embedding,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff_mime_recognizes_png() {
        assert_eq!(sniff_mime(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a]), "image/png");
        assert_eq!(sniff_mime(&[0xff, 0xd8, 0xff]), "image/jpeg");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = ClipClient::new("http://localhost:8100/v1/", "ViT-B-32");
        assert_eq!(client.base_url, "http://localhost:8100/v1");
    }
}
