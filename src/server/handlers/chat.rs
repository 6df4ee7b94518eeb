//! 流式对话端点

use axum::extract::{Request, State};
use axum::response::Response;

use crate::server::AppState;

/// POST /v1/chat/completions - 流式对话
pub async fn chat_completions(State(state): State<AppState>, request: Request) -> Response {
    tracing::debug!("[SERVER] {} {}", request.method(), request.uri());
    state.chat.clone().handle(request).await
}
