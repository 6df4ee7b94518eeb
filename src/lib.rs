//! streamcast: LLM 流式中继
//!
//! 把上游增量产出的事件（模型 token 或任意分块负载）实时转发给 HTTP 客户端，
//! 上游 SSE 被归一化为 `StreamEvent`，再按 SSE 或分块帧写出。

pub mod config;
pub mod logger;
pub mod models;
pub mod providers;
pub mod server;
pub mod stream;
pub mod streaming;

pub use config::Config;
pub use stream::StreamEvent;
pub use streaming::{StreamError, StreamHandler, StreamScope};
