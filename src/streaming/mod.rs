//! 流式传输模块
//!
//! 生产者产出事件通道，转换器把事件编码为传输帧写入输出端，处理器负责编排两者。
//!
//! ```text
//! 入站请求 ──> [StreamHandler] ──> [StreamProducer] ──> StreamEvent 通道 ──> [StreamConverter] ──> ResponseSink
//!                    │
//!                    └── StreamScope（请求生命周期 + 固定截止时间）
//! ```

pub mod converter;
pub mod error;
pub mod handler;
pub mod producer;
pub mod scope;
pub mod sink;

pub use converter::{ChunkedConverter, SseConverter, StreamConverter, StreamOptions};
pub use error::StreamError;
pub use handler::{StreamHandler, StreamOutcome};
pub use producer::{producer_fn, ChatProducer, InboundRequest, StreamProducer};
pub use scope::StreamScope;
pub use sink::{channel_sink, ChannelSink, ResponseSink};
