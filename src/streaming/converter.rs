//! 流转换器
//!
//! 消费事件通道，把每个内容事件编码为传输帧写入输出端，每个事件 flush 一次。
//!
//! - `SseConverter`: `text/event-stream`，默认 `data: <payload>\n\n` 帧，也可选择结构化消息帧
//! - `ChunkedConverter`: 调用方指定 Content-Type，原样写出字节，不加帧标记

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use bytes::Bytes;

use super::error::StreamError;
use super::scope::StreamScope;
use super::sink::ResponseSink;
use crate::stream::events::{EventReceiver, StreamEvent};
use crate::stream::sse::{sse_data_processor, sse_message_processor};

/// 负载处理器，在编码前变换每个内容事件
pub type Processor = Arc<dyn Fn(Bytes) -> Result<Bytes, StreamError> + Send + Sync>;

/// 错误回调，在错误事件被传播前调用
pub type ErrorHook = Arc<dyn Fn(&StreamError) + Send + Sync>;

/// 帧编码函数
pub type Framing = fn(Bytes) -> Result<Bytes, StreamError>;

/// 流选项
#[derive(Clone, Default)]
pub struct StreamOptions {
    /// 负载处理器
    pub processor: Option<Processor>,
    /// 错误回调
    pub on_error: Option<ErrorHook>,
}

impl StreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_processor<F>(mut self, processor: F) -> Self
    where
        F: Fn(Bytes) -> Result<Bytes, StreamError> + Send + Sync + 'static,
    {
        self.processor = Some(Arc::new(processor));
        self
    }

    pub fn with_on_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&StreamError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(on_error));
        self
    }
}

impl std::fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamOptions")
            .field("processor", &self.processor.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// 流转换器
#[async_trait]
pub trait StreamConverter: Send + Sync {
    /// 消费事件直到通道关闭、作用域结束或遇到错误事件
    async fn convert(
        &self,
        scope: &StreamScope,
        sink: &mut dyn ResponseSink,
        events: EventReceiver,
    ) -> Result<(), StreamError>;
}

/// SSE 转换器
#[derive(Debug, Clone)]
pub struct SseConverter {
    options: StreamOptions,
    framing: Framing,
}

impl Default for SseConverter {
    fn default() -> Self {
        Self::new(StreamOptions::default())
    }
}

impl SseConverter {
    /// 使用 `data: <payload>\n\n` 帧
    pub fn new(options: StreamOptions) -> Self {
        Self {
            options,
            framing: sse_data_processor,
        }
    }

    /// 使用结构化消息帧，负载须为 `{id, event, data, retry}` JSON 信封
    pub fn with_message_framing(options: StreamOptions) -> Self {
        Self {
            options,
            framing: sse_message_processor,
        }
    }
}

#[async_trait]
impl StreamConverter for SseConverter {
    async fn convert(
        &self,
        scope: &StreamScope,
        sink: &mut dyn ResponseSink,
        events: EventReceiver,
    ) -> Result<(), StreamError> {
        if !sink.supports_flush() {
            return Err(StreamError::StreamingUnsupported);
        }

        set_stream_headers(sink.headers_mut(), HeaderValue::from_static("text/event-stream"));
        sink.headers_mut().insert(
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        );

        pump(scope, sink, events, &self.options, self.framing).await
    }
}

/// 分块转换器
#[derive(Debug, Clone)]
pub struct ChunkedConverter {
    options: StreamOptions,
    content_type: HeaderValue,
}

impl ChunkedConverter {
    /// 无效的 Content-Type 回退为 `application/octet-stream`
    pub fn new(content_type: &str, options: StreamOptions) -> Self {
        let content_type = HeaderValue::from_str(content_type).unwrap_or_else(|_| {
            tracing::warn!("[STREAM] 无效的 Content-Type: {:?}", content_type);
            HeaderValue::from_static("application/octet-stream")
        });
        Self {
            options,
            content_type,
        }
    }
}

#[async_trait]
impl StreamConverter for ChunkedConverter {
    async fn convert(
        &self,
        scope: &StreamScope,
        sink: &mut dyn ResponseSink,
        events: EventReceiver,
    ) -> Result<(), StreamError> {
        if !sink.supports_flush() {
            return Err(StreamError::StreamingUnsupported);
        }

        set_stream_headers(sink.headers_mut(), self.content_type.clone());

        let result = pump(scope, sink, events, &self.options, |data| Ok(data)).await;
        match &result {
            Ok(()) => tracing::debug!("[STREAM] 分块流结束"),
            Err(e) if e.is_cancellation() => tracing::debug!("[STREAM] 分块流被取消: {}", e),
            Err(e) => tracing::warn!("[STREAM] 分块流写出失败: {}", e),
        }
        result
    }
}

fn set_stream_headers(headers: &mut HeaderMap, content_type: HeaderValue) {
    headers.insert(CONTENT_TYPE, content_type);
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
}

/// 事件循环：错误事件先回调再返回；结束事件不写出；内容事件处理、编码、写入并 flush
async fn pump<F>(
    scope: &StreamScope,
    sink: &mut dyn ResponseSink,
    mut events: EventReceiver,
    options: &StreamOptions,
    framing: F,
) -> Result<(), StreamError>
where
    F: Fn(Bytes) -> Result<Bytes, StreamError> + Send + Sync,
{
    loop {
        let event = tokio::select! {
            biased;
            err = scope.done() => return Err(err),
            event = events.recv() => event,
        };

        let data = match event {
            None => return Ok(()),
            Some(StreamEvent::Error(err)) => {
                if let Some(on_error) = &options.on_error {
                    on_error(&err);
                }
                return Err(err);
            }
            Some(StreamEvent::Finish { reason }) => {
                tracing::debug!("[STREAM] 上游结束: {}", reason);
                continue;
            }
            Some(StreamEvent::Payload { data, .. }) => data,
        };

        let data = match &options.processor {
            Some(processor) => processor(data)?,
            None => data,
        };
        let frame = framing(data)?;

        tokio::select! {
            biased;
            err = scope.done() => return Err(err),
            written = write_frame(sink, &frame) => written?,
        }
    }
}

async fn write_frame(sink: &mut dyn ResponseSink, frame: &[u8]) -> Result<(), StreamError> {
    sink.write(frame).await?;
    sink.flush().await
}
