use serde::Deserialize;
use utoipa::ToSchema;

/// 搜索请求参数
#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchRequest {
    /// 查询文本
    pub query: String,
    /// 返回的结果数量，不填则使用服务端默认值
    pub count: Option<usize>,
}

/// 搜索响应（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct SearchResponse {
    /// 搜索耗时，单位为毫秒
    pub time: u32,
    /// 搜索结果，格式为 `(余弦距离, 图片路径)`
    pub result: Vec<(f32, String)>,
}
