//! OpenAI 兼容 Provider
//!
//! 向 Chat Completions 端点发起流式请求，逐行解析 `data: ` 帧，
//! 在后台任务中把内容增量转换为 `StreamEvent` 发送到有界通道。

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Request, StatusCode};

use super::traits::{send_event, ModelProvider, SendOutcome};
use crate::logger::sanitize_log_message;
use crate::models::chat::ChatRequest;
use crate::stream::events::{
    event_channel, EventReceiver, EventSender, StreamEvent, DEFAULT_CHANNEL_CAPACITY,
};
use crate::stream::sse::SseDecoder;
use crate::streaming::{StreamError, StreamScope};

/// 默认 Chat Completions 端点
pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI 兼容 Provider
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    /// 完整端点 URL
    endpoint: String,
    api_key: String,
    client: Client,
    channel_capacity: usize,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, client: Client) -> Self {
        Self {
            endpoint: DEFAULT_OPENAI_ENDPOINT.to_string(),
            api_key: api_key.into(),
            client,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// 设置端点，空字符串保留默认值
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        if !endpoint.trim().is_empty() {
            self.endpoint = endpoint;
        }
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request(&self, request: &ChatRequest) -> Result<Request, StreamError> {
        let body = serde_json::to_vec(request)
            .map_err(|e| StreamError::RequestConstruction(e.to_string()))?;

        self.client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .bearer_auth(&self.api_key)
            .body(body)
            .build()
            .map_err(|e| StreamError::RequestConstruction(e.to_string()))
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    async fn stream_chat(
        &self,
        scope: StreamScope,
        request: ChatRequest,
    ) -> Result<EventReceiver, StreamError> {
        let http_request = self.build_request(&request)?;
        let (tx, rx) = event_channel(self.channel_capacity);

        tracing::info!(
            "[PROVIDER] 发起流式请求: model={}, endpoint={}, messages={}",
            request.model,
            self.endpoint,
            request.messages.len()
        );

        tokio::spawn(read_upstream(self.client.clone(), http_request, scope, tx));
        Ok(rx)
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn provider_type(&self) -> &'static str {
        "openai"
    }
}

/// 作用域结束时发出唯一一个错误事件；通道已满时丢弃
fn abort_with(tx: &EventSender, err: StreamError) {
    tracing::debug!("[PROVIDER] 读取中止: {}", err);
    let _ = tx.try_send(StreamEvent::error(err));
}

/// 后台读取任务，返回即关闭通道
async fn read_upstream(client: Client, request: Request, scope: StreamScope, tx: EventSender) {
    let result = tokio::select! {
        biased;
        err = scope.done() => {
            abort_with(&tx, err);
            return;
        }
        result = client.execute(request) => result,
    };

    let response = match result {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("[PROVIDER] 上游请求失败: {}", e);
            let err = StreamError::UpstreamTransport(e.to_string());
            let _ = send_event(&tx, &scope, StreamEvent::error(err)).await;
            return;
        }
    };

    let status = response.status();
    if status != StatusCode::OK {
        let body = tokio::select! {
            biased;
            err = scope.done() => {
                abort_with(&tx, err);
                return;
            }
            text = response.text() => text.unwrap_or_default(),
        };
        tracing::warn!(
            "[PROVIDER] 上游返回错误状态 {}: {}",
            status.as_u16(),
            sanitize_log_message(&body)
        );
        let err = StreamError::UpstreamProtocol {
            status: status.as_u16(),
            body,
        };
        let _ = send_event(&tx, &scope, StreamEvent::error(err)).await;
        return;
    }

    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::new();

    loop {
        let next = tokio::select! {
            biased;
            err = scope.done() => {
                abort_with(&tx, err);
                return;
            }
            next = body.next() => next,
        };

        let eof = next.is_none();
        let events = match next {
            Some(Ok(chunk)) => decoder.push_chunk(&chunk),
            Some(Err(e)) => {
                tracing::warn!("[PROVIDER] 读取上游流失败: {}", e);
                let err = StreamError::UpstreamTransport(e.to_string());
                let _ = send_event(&tx, &scope, StreamEvent::error(err)).await;
                return;
            }
            None => decoder.finish(),
        };

        for event in events {
            match send_event(&tx, &scope, event).await {
                SendOutcome::Sent => {}
                SendOutcome::Closed => return,
                SendOutcome::Cancelled(err) => {
                    abort_with(&tx, err);
                    return;
                }
            }
        }

        if eof || decoder.is_done() {
            tracing::debug!("[PROVIDER] 上游流结束");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::ChatMessage;
    use axum::body::Body;
    use axum::http::HeaderMap;
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use axum::{Json, Router};
    use bytes::Bytes;
    use std::convert::Infallible;

    async fn spawn_upstream(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1/chat/completions")
    }

    fn sse_response(body: &'static str) -> Response {
        ([(CONTENT_TYPE, "text/event-stream")], body).into_response()
    }

    fn provider(endpoint: &str) -> OpenAiProvider {
        OpenAiProvider::new("sk-test", Client::new()).with_endpoint(endpoint)
    }

    fn request() -> ChatRequest {
        ChatRequest::new("gpt-4", vec![ChatMessage::user("hi")])
    }

    async fn collect(mut rx: EventReceiver) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_is_available_depends_on_api_key() {
        assert!(OpenAiProvider::new("sk-test", Client::new()).is_available());
        assert!(!OpenAiProvider::new("", Client::new()).is_available());
    }

    #[test]
    fn test_empty_endpoint_keeps_default() {
        let provider = OpenAiProvider::new("sk", Client::new()).with_endpoint("  ");
        assert_eq!(provider.endpoint(), DEFAULT_OPENAI_ENDPOINT);
    }

    #[test]
    fn test_build_request_sets_headers_and_body() {
        let provider = provider("http://127.0.0.1:1/v1/chat/completions");
        let http_request = provider.build_request(&request()).unwrap();
        assert_eq!(http_request.method(), reqwest::Method::POST);
        assert_eq!(
            http_request.headers()["authorization"],
            "Bearer sk-test"
        );
        assert_eq!(http_request.headers()["content-type"], "application/json");

        let body = http_request.body().and_then(|b| b.as_bytes()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(json["model"], "gpt-4");
        assert_eq!(json["stream"], true);
    }

    #[test]
    fn test_build_request_invalid_url() {
        let provider = provider("not a url");
        assert!(matches!(
            provider.build_request(&request()),
            Err(StreamError::RequestConstruction(_))
        ));
    }

    #[tokio::test]
    async fn test_stream_happy_path() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                assert_eq!(headers["authorization"], "Bearer sk-test");
                assert_eq!(body["stream"], true);
                sse_response(concat!(
                    "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
                    ": keep-alive\n\n",
                    "data: {broken json\n\n",
                    "data: {\"choices\":[{\"delta\":{\"content\":\" World\"}}]}\n\n",
                    "data: {\"choices\":[{\"delta\":{\"content\":\"!\"},\"finish_reason\":\"stop\"}]}\n\n",
                    "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
                    "data: [DONE]\n\n",
                    "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
                ))
            }),
        );
        let endpoint = spawn_upstream(app).await;

        let rx = provider(&endpoint)
            .stream_chat(StreamScope::background(), request())
            .await
            .unwrap();
        let events = collect(rx).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::payload("Hello"),
                StreamEvent::payload(" World"),
                StreamEvent::Payload {
                    data: Bytes::from_static(b"!"),
                    finish_reason: Some("stop".to_string()),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_without_done_ends_at_eof() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                // 最后一行没有换行符
                sse_response("data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}")
            }),
        );
        let endpoint = spawn_upstream(app).await;

        let rx = provider(&endpoint)
            .stream_chat(StreamScope::background(), request())
            .await
            .unwrap();
        assert_eq!(collect(rx).await, vec![StreamEvent::payload("tail")]);
    }

    #[tokio::test]
    async fn test_non_200_yields_single_protocol_error() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (
                    axum::http::StatusCode::UNAUTHORIZED,
                    "{\"error\":\"invalid api key\"}",
                )
            }),
        );
        let endpoint = spawn_upstream(app).await;

        let rx = provider(&endpoint)
            .stream_chat(StreamScope::background(), request())
            .await
            .unwrap();
        let events = collect(rx).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Error(StreamError::UpstreamProtocol { status, body }) => {
                assert_eq!(*status, 401);
                assert!(body.contains("invalid api key"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_yields_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let rx = provider(&format!("http://{addr}/v1/chat/completions"))
            .stream_chat(StreamScope::background(), request())
            .await
            .unwrap();
        let events = collect(rx).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            StreamEvent::Error(StreamError::UpstreamTransport(_))
        ));
    }

    #[tokio::test]
    async fn test_cancellation_emits_one_error_and_closes() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                let stream = async_stream::stream! {
                    yield Ok::<_, Infallible>(Bytes::from_static(
                        b"data: {\"choices\":[{\"delta\":{\"content\":\"first\"}}]}\n\n",
                    ));
                    futures::future::pending::<()>().await;
                };
                Response::builder()
                    .header(CONTENT_TYPE, "text/event-stream")
                    .body(Body::from_stream(stream))
                    .unwrap()
            }),
        );
        let endpoint = spawn_upstream(app).await;

        let scope = StreamScope::background();
        let mut rx = provider(&endpoint)
            .stream_chat(scope.clone(), request())
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(StreamEvent::payload("first")));

        scope.cancel();
        assert_eq!(
            rx.recv().await,
            Some(StreamEvent::error(StreamError::Cancelled))
        );
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_body_error_mid_stream_is_transport_error() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                let stream = async_stream::stream! {
                    yield Ok::<_, std::io::Error>(Bytes::from_static(
                        b"data: {\"choices\":[{\"delta\":{\"content\":\"first\"}}]}\n\n",
                    ));
                    yield Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "upstream reset"));
                };
                Response::builder()
                    .header(CONTENT_TYPE, "text/event-stream")
                    .body(Body::from_stream(stream))
                    .unwrap()
            }),
        );
        let endpoint = spawn_upstream(app).await;

        let mut rx = provider(&endpoint)
            .stream_chat(StreamScope::background(), request())
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(StreamEvent::payload("first")));
        assert!(matches!(
            rx.recv().await,
            Some(StreamEvent::Error(StreamError::UpstreamTransport(_)))
        ));
        assert_eq!(rx.recv().await, None);
    }
}
