//! 流数据层
//!
//! - `events`: 统一的流事件 `StreamEvent` 与有界事件通道
//! - `sse`: SSE 帧编解码（`data:` 行解码、原始/结构化编码、负载处理器）

pub mod events;
pub mod sse;

pub use events::{event_channel, EventReceiver, EventSender, StreamEvent};
pub use sse::{SseDecoder, SseMessage};
