//! Provider Trait 定义
//!
//! 统一的模型 Provider 接口：发起流式对话、报告可用性。

use async_trait::async_trait;

use crate::models::chat::ChatRequest;
use crate::stream::events::{EventReceiver, EventSender, StreamEvent};
use crate::streaming::{StreamError, StreamScope};

/// 模型 Provider
///
/// `stream_chat` 只在请求构造失败时立即返回错误；网络失败以错误事件的形式出现在通道里。
/// 后台任务在任何退出路径上都会关闭通道（drop 发送端），消费者以通道关闭为唯一终止信号。
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// 流式对话
    async fn stream_chat(
        &self,
        scope: StreamScope,
        request: ChatRequest,
    ) -> Result<EventReceiver, StreamError>;

    /// 是否可用（纯判断，不做 I/O）
    fn is_available(&self) -> bool;

    /// Provider 类型名称
    fn provider_type(&self) -> &'static str;
}

/// 发送结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SendOutcome {
    /// 已入队
    Sent,
    /// 消费者已离开
    Closed,
    /// 作用域结束
    Cancelled(StreamError),
}

/// 在作用域内发送事件；通道满时挂起，作用域结束时立即返回
pub(crate) async fn send_event(
    tx: &EventSender,
    scope: &StreamScope,
    event: StreamEvent,
) -> SendOutcome {
    tokio::select! {
        biased;
        err = scope.done() => SendOutcome::Cancelled(err),
        sent = tx.send(event) => match sent {
            Ok(()) => SendOutcome::Sent,
            Err(_) => SendOutcome::Closed,
        },
    }
}
