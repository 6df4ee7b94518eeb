//! 模型列表与健康检查端点

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::server::AppState;

/// 模型列表响应
#[derive(Debug, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelEntry>,
}

/// 单个模型
#[derive(Debug, Serialize)]
pub struct ModelEntry {
    pub id: String,
    pub object: &'static str,
}

/// GET /v1/models - 当前可用模型（按名称排序）
pub async fn list_models(State(state): State<AppState>) -> Json<ModelList> {
    let data = state
        .registry
        .list_available()
        .into_iter()
        .map(|id| ModelEntry { id, object: "model" })
        .collect();
    Json(ModelList {
        object: "list",
        data,
    })
}

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
