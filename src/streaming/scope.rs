//! 流作用域
//!
//! 每个流一个作用域：入站请求的生命周期（父级取消令牌）叠加一个固定的截止时间。
//! 它是流中唯一的取消来源，后台读取任务和转换器都在每次迭代时检查它。

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::error::StreamError;

/// 取消/截止时间作用域
#[derive(Debug, Clone)]
pub struct StreamScope {
    token: CancellationToken,
    deadline: Option<Instant>,
    /// 首个终止原因，先到先得
    cause: Arc<OnceLock<StreamError>>,
}

impl Default for StreamScope {
    fn default() -> Self {
        Self::background()
    }
}

impl StreamScope {
    /// 创建没有父级、没有截止时间的作用域
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            cause: Arc::new(OnceLock::new()),
        }
    }

    /// 从父级令牌派生作用域，父级取消时作用域随之取消
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            deadline: None,
            cause: Arc::new(OnceLock::new()),
        }
    }

    /// 从父级令牌派生带固定超时的作用域
    pub fn with_timeout(parent: &CancellationToken, timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            ..Self::new(parent)
        }
    }

    /// 获取截止时间
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// 获取底层取消令牌
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// 主动取消作用域
    pub fn cancel(&self) {
        let _ = self.cause.set(StreamError::Cancelled);
        self.token.cancel();
    }

    /// 返回一个 guard，drop 时取消作用域
    pub fn cancel_on_drop(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }

    /// 非阻塞检查：作用域已结束时返回终止原因
    pub fn err(&self) -> Option<StreamError> {
        if let Some(cause) = self.cause.get() {
            return Some(cause.clone());
        }
        if self.token.is_cancelled() {
            return Some(self.cause.get_or_init(|| StreamError::Cancelled).clone());
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(self.expire()),
            _ => None,
        }
    }

    /// 等待作用域结束，返回终止原因
    pub async fn done(&self) -> StreamError {
        if let Some(err) = self.err() {
            return err;
        }
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => {
                        self.cause.get_or_init(|| StreamError::Cancelled).clone()
                    }
                    _ = tokio::time::sleep_until(deadline) => self.expire(),
                }
            }
            None => {
                self.token.cancelled().await;
                self.cause.get_or_init(|| StreamError::Cancelled).clone()
            }
        }
    }

    fn expire(&self) -> StreamError {
        let cause = self
            .cause
            .get_or_init(|| StreamError::DeadlineExceeded)
            .clone();
        self.token.cancel();
        cause
    }
}
