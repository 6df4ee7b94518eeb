//! HTTP 服务
//!
//! axum 路由：
//! - `POST /v1/chat/completions`: 流式对话（SSE）
//! - `GET /v1/models`: 可用模型列表
//! - `GET /health`: 健康检查

pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::config::{Config, ConfigError};
use crate::providers::ModelRegistry;
use crate::streaming::{ChatProducer, SseConverter, StreamHandler};

/// 应用状态
#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: Arc<ModelRegistry>,
    pub chat: Arc<StreamHandler>,
}

impl AppState {
    pub fn new(registry: Arc<ModelRegistry>, chat: StreamHandler) -> Self {
        Self {
            registry,
            chat: Arc::new(chat),
        }
    }

    /// 从配置构造注册表和对话处理器
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let registry = Arc::new(config.build_registry()?);
        let chat = StreamHandler::new(
            config.server.stream_timeout(),
            Arc::new(ChatProducer::new(Arc::clone(&registry))),
            Arc::new(SseConverter::default()),
        )
        .with_max_request_bytes(config.server.max_request_bytes);
        Ok(Self::new(registry, chat))
    }
}

/// 构建路由
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/models", get(handlers::list_models))
        .route("/health", get(handlers::health))
        .with_state(state)
}

/// 启动服务，收到 Ctrl-C 后优雅退出
pub async fn run_server(config: &Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = AppState::from_config(config)?;
    let models = state.registry.list_available();
    let app = create_router(state);

    let addr = config.server.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("[SERVER] 监听 {}，可用模型: {:?}", addr, models);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("[SERVER] 收到退出信号");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_router() -> Router {
        let mut mock = ProviderConfig::mock("mock");
        mock.delay_ms = 0;
        let mut offline = ProviderConfig::mock("offline");
        offline.kind = crate::config::ProviderKind::OpenAi;
        let config = Config {
            providers: vec![mock, offline],
            ..Config::default()
        };
        create_router(AppState::from_config(&config).unwrap())
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = test_router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_list_models_only_available() {
        let response = test_router()
            .oneshot(Request::get("/v1/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["object"], "list");
        assert_eq!(json["data"].as_array().unwrap().len(), 1);
        assert_eq!(json["data"][0]["id"], "mock");
    }

    #[tokio::test]
    async fn test_chat_completions_streams() {
        let request = Request::post("/v1/chat/completions")
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"model":"mock","messages":[{"role":"user","content":"ping"}]}"#,
            ))
            .unwrap();
        let response = test_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");
        assert_eq!(response.headers()["cache-control"], "no-cache");

        let body = body_string(response).await;
        let text: String = body
            .split("\n\n")
            .filter_map(|frame| frame.strip_prefix("data: "))
            .collect();
        assert!(text.contains("你说的是：ping"));
    }

    #[tokio::test]
    async fn test_chat_completions_unavailable_model() {
        let request = Request::post("/v1/chat/completions")
            .body(Body::from(r#"{"model":"offline","messages":[]}"#))
            .unwrap();
        let response = test_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_string(response).await, "model offline is not available\n");
    }
}
