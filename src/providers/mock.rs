//! Mock Provider
//!
//! 本地演示/测试用：回显最后一条 user 消息并附加固定说明，逐字符输出，不访问网络。

use std::time::Duration;

use async_trait::async_trait;

use super::traits::{send_event, ModelProvider, SendOutcome};
use crate::models::chat::ChatRequest;
use crate::stream::events::{
    event_channel, EventReceiver, EventSender, StreamEvent, DEFAULT_CHANNEL_CAPACITY,
};
use crate::streaming::{StreamError, StreamScope};

/// 默认逐字符延迟
pub const DEFAULT_MOCK_DELAY: Duration = Duration::from_millis(20);

const MOCK_DETAILS: [&str; 4] = [
    "首先，这是第一点说明。",
    "其次，这里有一些补充信息。",
    "另外，还需要考虑以下因素。",
    "最后，总结一下要点。",
];

/// 生成完整的模拟回复文本
pub fn mock_reply(name: &str, user_message: &str) -> String {
    let mut reply = format!("这是来自 {name} 模型的回复。你说的是：{user_message}\n\n让我为你详细解答：\n");
    for detail in MOCK_DETAILS {
        reply.push_str(detail);
        reply.push('\n');
    }
    reply
}

/// Mock Provider
#[derive(Debug, Clone)]
pub struct MockProvider {
    name: String,
    delay: Duration,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delay: DEFAULT_MOCK_DELAY,
        }
    }

    /// 设置逐字符延迟，零表示不等待
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn stream_chat(
        &self,
        scope: StreamScope,
        request: ChatRequest,
    ) -> Result<EventReceiver, StreamError> {
        let reply = mock_reply(&self.name, request.last_user_message().unwrap_or_default());
        let (tx, rx) = event_channel(DEFAULT_CHANNEL_CAPACITY);

        tracing::debug!("[PROVIDER] mock 回复 {} 个字符", reply.chars().count());
        tokio::spawn(emit_reply(reply, self.delay, scope, tx));
        Ok(rx)
    }

    fn is_available(&self) -> bool {
        true
    }

    fn provider_type(&self) -> &'static str {
        "mock"
    }
}

/// 作用域结束时静默退出
async fn emit_reply(reply: String, delay: Duration, scope: StreamScope, tx: EventSender) {
    let mut buf = [0u8; 4];
    for ch in reply.chars() {
        let piece = ch.encode_utf8(&mut buf).to_string();
        if send_event(&tx, &scope, StreamEvent::payload(piece)).await != SendOutcome::Sent {
            return;
        }
        if !delay.is_zero() {
            tokio::select! {
                biased;
                _ = scope.done() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    let _ = send_event(&tx, &scope, StreamEvent::finish("stop")).await;
}
