//! 响应输出端
//!
//! `ResponseSink` 是转换器写出帧的目标：可设置状态码和响应头，可写入，可增量 flush。
//!
//! axum 侧由 `ChannelSink` 实现：状态码和响应头在第一次写入、flush 或 drop 时提交一次，
//! 每次 flush 把已写入的字节作为一个 body chunk 通过有界通道交给 axum。
//! axum drop 响应 body（客户端断开或响应结束）时，持有的 `DropGuard` 取消流作用域。

use std::convert::Infallible;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::DropGuard;

use super::error::StreamError;

/// body chunk 通道的默认容量
pub const DEFAULT_BODY_CAPACITY: usize = 16;

/// 响应输出端
#[async_trait]
pub trait ResponseSink: Send {
    /// 响应头，提交之后的修改不再生效
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// 设置状态码，提交之后的修改不再生效
    fn set_status(&mut self, status: StatusCode);

    /// 写入字节
    async fn write(&mut self, data: &[u8]) -> Result<(), StreamError>;

    /// 是否支持增量 flush
    fn supports_flush(&self) -> bool {
        true
    }

    /// 把已写入的字节推送给客户端
    async fn flush(&mut self) -> Result<(), StreamError>;
}

/// 已提交的响应头
#[derive(Debug)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// 基于通道的 axum 输出端
#[derive(Debug)]
pub struct ChannelSink {
    status: StatusCode,
    headers: HeaderMap,
    head_tx: Option<oneshot::Sender<ResponseHead>>,
    body_tx: mpsc::Sender<Bytes>,
    buf: BytesMut,
}

/// 等待提交的 axum 响应
#[derive(Debug)]
pub struct PendingResponse {
    head_rx: oneshot::Receiver<ResponseHead>,
    body_rx: mpsc::Receiver<Bytes>,
}

/// 创建一对输出端与待提交响应
pub fn channel_sink(capacity: usize) -> (ChannelSink, PendingResponse) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(capacity.max(1));
    (
        ChannelSink {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            head_tx: Some(head_tx),
            body_tx,
            buf: BytesMut::new(),
        },
        PendingResponse { head_rx, body_rx },
    )
}

impl ChannelSink {
    /// 是否已提交状态码和响应头
    pub fn is_committed(&self) -> bool {
        self.head_tx.is_none()
    }

    fn commit(&mut self) {
        if let Some(head_tx) = self.head_tx.take() {
            let head = ResponseHead {
                status: self.status,
                headers: std::mem::take(&mut self.headers),
            };
            let _ = head_tx.send(head);
        }
    }
}

#[async_trait]
impl ResponseSink for ChannelSink {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), StreamError> {
        self.commit();
        if self.body_tx.is_closed() {
            return Err(StreamError::SinkWrite("response body closed".to_string()));
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), StreamError> {
        self.commit();
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = self.buf.split().freeze();
        self.body_tx
            .send(chunk)
            .await
            .map_err(|_| StreamError::SinkWrite("response body closed".to_string()))
    }
}

impl Drop for ChannelSink {
    fn drop(&mut self) {
        self.commit();
        if !self.buf.is_empty() {
            let _ = self.body_tx.try_send(self.buf.split().freeze());
        }
    }
}

impl PendingResponse {
    /// 等待响应头提交后构造 axum 响应
    ///
    /// `disconnect` 随 body 一起存活，body 被 drop 时触发取消。
    pub async fn into_response(self, disconnect: DropGuard) -> Response {
        let Self { head_rx, mut body_rx } = self;

        let head = match head_rx.await {
            Ok(head) => head,
            Err(_) => {
                tracing::error!("[STREAM] 输出端未提交响应头即被释放");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({"error": {"message": "stream handler aborted"}})),
                )
                    .into_response();
            }
        };

        let body_stream = async_stream::stream! {
            let _disconnect = disconnect;
            while let Some(chunk) = body_rx.recv().await {
                yield Ok::<Bytes, Infallible>(chunk);
            }
        };

        let mut response = Response::new(Body::from_stream(body_stream));
        *response.status_mut() = head.status;
        *response.headers_mut() = head.headers;
        response
    }
}

/// 测试用输出端：记录状态码、响应头、写入内容和 flush 次数
#[cfg(test)]
#[derive(Debug)]
pub struct RecordingSink {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BytesMut,
    pub flushes: usize,
    pub flushable: bool,
    pub fail_writes: bool,
}

#[cfg(test)]
impl Default for RecordingSink {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            flushes: 0,
            flushable: true,
            fail_writes: false,
        }
    }
}

#[cfg(test)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 不支持 flush 的输出端
    pub fn without_flush() -> Self {
        Self {
            flushable: false,
            ..Self::default()
        }
    }

    /// 写入总是失败的输出端
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[cfg(test)]
#[async_trait]
impl ResponseSink for RecordingSink {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), StreamError> {
        if self.fail_writes {
            return Err(StreamError::SinkWrite("broken pipe".to_string()));
        }
        self.body.extend_from_slice(data);
        Ok(())
    }

    fn supports_flush(&self) -> bool {
        self.flushable
    }

    async fn flush(&mut self) -> Result<(), StreamError> {
        self.flushes += 1;
        Ok(())
    }
}
