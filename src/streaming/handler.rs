//! 流处理器
//!
//! 为每个入站请求派生带截止时间的作用域，先调用生产者，再调用转换器，
//! 把第一个错误映射为传输层结局。转换阶段的任何失败都只记录日志，不影响服务进程。

use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::http::header::{CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio_util::sync::CancellationToken;

use super::converter::StreamConverter;
use super::error::StreamError;
use super::producer::{InboundRequest, StreamProducer};
use super::scope::StreamScope;
use super::sink::{channel_sink, ResponseSink, DEFAULT_BODY_CAPACITY};

/// 默认流超时
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(300);

/// 默认请求体上限
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// 单个流的结局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// 通道正常关闭
    Completed,
    /// 流未能开始，或中途出错/超时
    Failed,
    /// 客户端断开
    Disconnected,
}

/// 流处理器
pub struct StreamHandler {
    timeout: Duration,
    producer: Arc<dyn StreamProducer>,
    converter: Arc<dyn StreamConverter>,
    max_request_bytes: usize,
}

impl std::fmt::Debug for StreamHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandler")
            .field("timeout", &self.timeout)
            .field("max_request_bytes", &self.max_request_bytes)
            .finish_non_exhaustive()
    }
}

impl StreamHandler {
    pub fn new(
        timeout: Duration,
        producer: Arc<dyn StreamProducer>,
        converter: Arc<dyn StreamConverter>,
    ) -> Self {
        Self {
            timeout,
            producer,
            converter,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }

    pub fn with_max_request_bytes(mut self, limit: usize) -> Self {
        self.max_request_bytes = limit;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 处理一个流
    ///
    /// `parent` 代表入站请求的生命周期，取消它等同于客户端断开。
    pub async fn serve(
        &self,
        parent: &CancellationToken,
        request: InboundRequest,
        sink: &mut dyn ResponseSink,
    ) -> StreamOutcome {
        let scope = StreamScope::with_timeout(parent, self.timeout);
        let _cancel = scope.cancel_on_drop();

        let events = match self.producer.produce(scope.clone(), request).await {
            Ok(events) => events,
            Err(err) => {
                tracing::warn!("[STREAM] 流无法开始: {}", err);
                reject(sink, &err).await;
                return StreamOutcome::Failed;
            }
        };

        match self.converter.convert(&scope, sink, events).await {
            Ok(()) => {
                tracing::debug!("[STREAM] 流完成");
                StreamOutcome::Completed
            }
            Err(StreamError::Cancelled) => {
                tracing::info!("[STREAM] 客户端断开");
                StreamOutcome::Disconnected
            }
            Err(StreamError::DeadlineExceeded) => {
                tracing::info!("[STREAM] 流超过截止时间 {:?}", self.timeout);
                StreamOutcome::Failed
            }
            Err(err) => {
                tracing::error!("[STREAM] 流转换失败 ({}): {}", err.error_type(), err);
                StreamOutcome::Failed
            }
        }
    }

    /// axum 入口：读取请求体，在独立任务中运行 `serve`，响应头提交后返回流式响应
    pub async fn handle(self: Arc<Self>, request: Request) -> Response {
        let (parts, body) = request.into_parts();
        let body = match axum::body::to_bytes(body, self.max_request_bytes).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("[STREAM] 读取请求体失败: {}", e);
                return (StatusCode::BAD_REQUEST, format!("{e}\n")).into_response();
            }
        };
        let inbound = InboundRequest::from_parts(parts, body);

        let disconnect = CancellationToken::new();
        let guard = disconnect.clone().drop_guard();
        let (mut sink, pending) = channel_sink(DEFAULT_BODY_CAPACITY);

        tokio::spawn(async move {
            let outcome = self.serve(&disconnect, inbound, &mut sink).await;
            tracing::debug!("[STREAM] 结局: {:?}", outcome);
        });

        pending.into_response(guard).await
    }
}

/// 流开始前失败：5xx + 纯文本错误
async fn reject(sink: &mut dyn ResponseSink, err: &StreamError) {
    sink.set_status(err.status_code());
    let headers = sink.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));

    let message = format!("{err}\n");
    if let Err(e) = sink.write(message.as_bytes()).await {
        tracing::debug!("[STREAM] 写入错误响应失败: {}", e);
        return;
    }
    if sink.supports_flush() {
        let _ = sink.flush().await;
    }
}
