//! 流式传输错误类型
//!
//! 覆盖流式管道从请求构造、上游调用、帧编解码到响应写出的全部错误。
//! 流中途的错误通过 `StreamEvent::Error` 在事件通道中传递，因此该类型需要 `Clone`。

use axum::http::StatusCode;
use thiserror::Error;

/// 流式传输错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// 请求构造失败（发送前，例如序列化失败）
    #[error("请求构造失败: {0}")]
    RequestConstruction(String),

    /// 上游网络/连接失败
    #[error("上游传输错误: {0}")]
    UpstreamTransport(String),

    /// 上游返回非 200 状态，body 原样保留
    #[error("API error ({status}): {body}")]
    UpstreamProtocol { status: u16, body: String },

    /// 结构化帧解析失败
    #[error("帧解析失败: {0}")]
    Decode(String),

    /// 输出端不支持增量 flush
    #[error("streaming not supported")]
    StreamingUnsupported,

    /// 作用域被取消（客户端断开）
    #[error("context canceled")]
    Cancelled,

    /// 作用域超过截止时间
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// 写入响应失败
    #[error("写入响应失败: {0}")]
    SinkWrite(String),

    /// 数据处理器失败
    #[error("{0}")]
    Processor(String),

    /// 模型未注册
    #[error("model {0} not found")]
    ModelNotFound(String),

    /// 模型已注册但不可用
    #[error("model {0} is not available")]
    ModelUnavailable(String),
}

impl StreamError {
    /// 是否为取消/超时类错误
    ///
    /// 这类错误在 handler 层视为正常结局，不升级为故障。
    pub fn is_cancellation(&self) -> bool {
        matches!(self, StreamError::Cancelled | StreamError::DeadlineExceeded)
    }

    /// 流开始前被拒绝时使用的 HTTP 状态码（始终为 5xx）
    pub fn status_code(&self) -> StatusCode {
        match self {
            StreamError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            StreamError::UpstreamTransport(_) | StreamError::UpstreamProtocol { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 获取错误类型字符串
    pub fn error_type(&self) -> &'static str {
        match self {
            StreamError::RequestConstruction(_) => "request_construction_error",
            StreamError::UpstreamTransport(_) => "upstream_transport_error",
            StreamError::UpstreamProtocol { .. } => "upstream_protocol_error",
            StreamError::Decode(_) => "decode_error",
            StreamError::StreamingUnsupported => "streaming_unsupported",
            StreamError::Cancelled => "cancelled",
            StreamError::DeadlineExceeded => "deadline_exceeded",
            StreamError::SinkWrite(_) => "sink_write_error",
            StreamError::Processor(_) => "processor_error",
            StreamError::ModelNotFound(_) => "model_not_found",
            StreamError::ModelUnavailable(_) => "model_unavailable",
        }
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Decode(err.to_string())
    }
}
