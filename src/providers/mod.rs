//! Provider 模块
//!
//! 上游模型 Provider 的统一接口与实现：
//! - `traits`: `ModelProvider` 接口
//! - `openai`: OpenAI 兼容的 HTTP 流式 Provider
//! - `mock`: 本地回显 Provider
//! - `client`: reqwest 客户端工厂
//! - `registry`: 模型名称到 Provider 的注册表

pub mod client;
pub mod mock;
pub mod openai;
pub mod registry;
pub mod traits;

pub use client::{ClientError, HttpClientFactory};
pub use mock::MockProvider;
pub use openai::{OpenAiProvider, DEFAULT_OPENAI_ENDPOINT};
pub use registry::ModelRegistry;
pub use traits::ModelProvider;
