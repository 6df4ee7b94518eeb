//! 数据模型

pub mod chat;

pub use chat::{ChatMessage, ChatRequest, ChatResponse, ChatRole};
