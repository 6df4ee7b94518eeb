//! HTTP 端点处理器

pub mod chat;
pub mod models;

pub use chat::chat_completions;
pub use models::{health, list_models};
