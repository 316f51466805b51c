use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use log::info;
use serde_json::{Value, json};

use super::error::Result;
use super::state::AppState;
use super::types::*;

/// 使用自然语言搜索图片
#[utoipa::path(
    post,
    path = "/search",
    request_body = SearchRequest,
    responses(
        (status = 200, body = SearchResponse),
    )
)]
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<SearchRequest>,
) -> Result<Json<Value>> {
    let count = data.count.unwrap_or(state.search.count);

    info!("正在搜索: {}", data.query);

    let start = Instant::now();
    let result = state.session.search(&data.query, count).await?;

    Ok(Json(json!({
        "time": start.elapsed().as_millis(),
        "result": result,
    })))
}
