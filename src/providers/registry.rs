//! 模型注册表
//!
//! 模型名称到 Provider 的并发安全映射：多读单写，同名注册覆盖旧值。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::traits::ModelProvider;
use crate::streaming::StreamError;

/// 模型注册表
#[derive(Default)]
pub struct ModelRegistry {
    providers: RwLock<HashMap<String, Arc<dyn ModelProvider>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册 Provider，同名时替换
    pub fn register(&self, name: impl Into<String>, provider: Arc<dyn ModelProvider>) {
        let name = name.into();
        tracing::info!(
            "[REGISTRY] 注册模型: {} ({})",
            name,
            provider.provider_type()
        );
        self.providers.write().insert(name, provider);
    }

    /// 移除 Provider，返回被移除的值
    pub fn remove(&self, name: &str) -> Option<Arc<dyn ModelProvider>> {
        self.providers.write().remove(name)
    }

    /// 按名称查找可用的 Provider
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ModelProvider>, StreamError> {
        let providers = self.providers.read();
        let provider = providers
            .get(name)
            .ok_or_else(|| StreamError::ModelNotFound(name.to_string()))?;

        if !provider.is_available() {
            return Err(StreamError::ModelUnavailable(name.to_string()));
        }

        Ok(Arc::clone(provider))
    }

    /// 列出当前可用的模型名称（按名称排序）
    pub fn list_available(&self) -> Vec<String> {
        let providers = self.providers.read();
        let mut names: Vec<String> = providers
            .iter()
            .filter(|(_, provider)| provider.is_available())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.providers.read().keys().collect::<Vec<_>>())
            .finish()
    }
}
