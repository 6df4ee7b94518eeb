//! 统一流事件类型
//!
//! 定义流式传输的中间表示，用于解耦上游 (providers/producers) 和下游 (converters)。
//!
//! # 设计原则
//!
//! - 生产者为上游的每一步进展输出一个 `StreamEvent`
//! - 转换器逐个消费 `StreamEvent`，消费后不保留
//! - 事件通道关闭是唯一的终止信号；错误事件或结束事件之后不再有事件

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::streaming::StreamError;

/// 事件通道默认容量
///
/// 较小的上界提供背压：消费者变慢时，上游读取循环在通道满时挂起。
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// 事件发送端
pub type EventSender = mpsc::Sender<StreamEvent>;

/// 事件接收端
pub type EventReceiver = mpsc::Receiver<StreamEvent>;

/// 创建有界事件通道
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity.max(1))
}

/// 统一流事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// 内容片段
    ///
    /// 上游 delta 同时携带内容和 finish_reason 时，两者一起传递。
    Payload {
        /// 内容字节
        data: Bytes,
        /// 上游的结束原因（可选）
        finish_reason: Option<String>,
    },

    /// 正常结束
    Finish {
        /// 结束原因，例如 "stop"
        reason: String,
    },

    /// 错误事件，之后通道关闭
    Error(StreamError),
}

impl StreamEvent {
    /// 创建内容事件
    pub fn payload(data: impl Into<Bytes>) -> Self {
        Self::Payload {
            data: data.into(),
            finish_reason: None,
        }
    }

    /// 创建结束事件
    pub fn finish(reason: impl Into<String>) -> Self {
        Self::Finish {
            reason: reason.into(),
        }
    }

    /// 创建错误事件
    pub fn error(err: StreamError) -> Self {
        Self::Error(err)
    }

    /// 是否为终止事件（结束或错误）
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish { .. } | Self::Error(_))
    }

    /// 获取内容字节
    pub fn data(&self) -> Option<&Bytes> {
        match self {
            Self::Payload { data, .. } => Some(data),
            _ => None,
        }
    }

    /// 获取内容文本（非 UTF-8 时返回 None）
    pub fn as_text(&self) -> Option<&str> {
        self.data().and_then(|d| std::str::from_utf8(d).ok())
    }

    /// 获取结束原因
    pub fn finish_reason(&self) -> Option<&str> {
        match self {
            Self::Payload { finish_reason, .. } => finish_reason.as_deref(),
            Self::Finish { reason } => Some(reason.as_str()),
            Self::Error(_) => None,
        }
    }
}
