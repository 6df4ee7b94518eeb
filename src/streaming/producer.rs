//! 流生产者
//!
//! 给定入站请求，产出事件通道。`StreamHandler` 只依赖这个接口，不关心上游是谁。

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Request;
use bytes::Bytes;

use super::error::StreamError;
use super::scope::StreamScope;
use crate::models::chat::ChatRequest;
use crate::providers::ModelRegistry;
use crate::stream::events::EventReceiver;

/// 入站请求（body 已读入内存）
pub type InboundRequest = Request<Bytes>;

/// 流生产者
#[async_trait]
pub trait StreamProducer: Send + Sync {
    /// 立即返回的错误表示流无法开始；之后的错误以错误事件传递
    async fn produce(
        &self,
        scope: StreamScope,
        request: InboundRequest,
    ) -> Result<EventReceiver, StreamError>;
}

/// 闭包适配器
#[derive(Clone)]
pub struct ProducerFn<F>(F);

/// 把异步闭包包装为 `StreamProducer`
pub fn producer_fn<F, Fut>(f: F) -> ProducerFn<F>
where
    F: Fn(StreamScope, InboundRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<EventReceiver, StreamError>> + Send,
{
    ProducerFn(f)
}

#[async_trait]
impl<F, Fut> StreamProducer for ProducerFn<F>
where
    F: Fn(StreamScope, InboundRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<EventReceiver, StreamError>> + Send,
{
    async fn produce(
        &self,
        scope: StreamScope,
        request: InboundRequest,
    ) -> Result<EventReceiver, StreamError> {
        (self.0)(scope, request).await
    }
}

/// 基于模型注册表的聊天生产者
///
/// 解析入站 JSON 为 `ChatRequest`，按 `model` 查找 Provider 并发起流式对话。
#[derive(Debug, Clone)]
pub struct ChatProducer {
    registry: Arc<ModelRegistry>,
}

impl ChatProducer {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }
}

#[async_trait]
impl StreamProducer for ChatProducer {
    async fn produce(
        &self,
        scope: StreamScope,
        request: InboundRequest,
    ) -> Result<EventReceiver, StreamError> {
        let mut chat: ChatRequest = serde_json::from_slice(request.body())
            .map_err(|e| StreamError::RequestConstruction(format!("invalid chat request: {e}")))?;
        chat.stream = true;

        let provider = self.registry.resolve(&chat.model)?;
        tracing::info!(
            "[STREAM] 开始流式对话: model={}, provider={}",
            chat.model,
            provider.provider_type()
        );
        provider.stream_chat(scope, chat).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockProvider;
    use crate::stream::events::{event_channel, StreamEvent};
    use std::time::Duration;

    fn inbound(body: &str) -> InboundRequest {
        Request::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .body(Bytes::from(body.to_string()))
            .unwrap()
    }

    fn registry() -> Arc<ModelRegistry> {
        let registry = ModelRegistry::new();
        registry.register(
            "mock",
            Arc::new(MockProvider::new("mock").with_delay(Duration::ZERO)),
        );
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_producer_fn_adapter() {
        let producer = producer_fn(|_scope, request: InboundRequest| async move {
            let (tx, rx) = event_channel(2);
            tx.send(StreamEvent::payload(request.into_body())).await.ok();
            Ok::<_, StreamError>(rx)
        });

        let mut rx = producer
            .produce(StreamScope::background(), inbound("echo"))
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(StreamEvent::payload("echo")));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_chat_producer_streams_from_registry() {
        let producer = ChatProducer::new(registry());
        let mut rx = producer
            .produce(
                StreamScope::background(),
                inbound(r#"{"model":"mock","messages":[{"role":"user","content":"hi"}]}"#),
            )
            .await
            .unwrap();

        let mut text = String::new();
        while let Some(event) = rx.recv().await {
            if let Some(piece) = event.as_text() {
                text.push_str(piece);
            }
        }
        assert!(text.contains("你说的是：hi"));
    }

    #[tokio::test]
    async fn test_chat_producer_rejects_invalid_body() {
        let producer = ChatProducer::new(registry());
        let err = producer
            .produce(StreamScope::background(), inbound("{not json"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StreamError::RequestConstruction(_)));
    }

    #[tokio::test]
    async fn test_chat_producer_unknown_model() {
        let producer = ChatProducer::new(registry());
        let err = producer
            .produce(
                StreamScope::background(),
                inbound(r#"{"model":"gpt-4","messages":[]}"#),
            )
            .await
            .err()
            .unwrap();
        assert_eq!(err, StreamError::ModelNotFound("gpt-4".to_string()));
    }
}
