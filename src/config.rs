//! 配置模块
//!
//! YAML 配置：服务监听、日志级别、模型 Provider 列表。
//! 加载顺序：显式路径 → `STREAMCAST_CONFIG` 环境变量 → `~/.streamcast/config.yaml` → 内置默认值。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::providers::{
    ClientError, HttpClientFactory, MockProvider, ModelProvider, ModelRegistry, OpenAiProvider,
};

/// 配置文件路径环境变量
pub const CONFIG_ENV: &str = "STREAMCAST_CONFIG";

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件失败 {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("解析 YAML 失败: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("配置校验失败: {0}")]
    Validation(String),

    #[error("创建 HTTP 客户端失败: {0}")]
    Client(#[from] ClientError),
}

/// 主配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub providers: Vec<ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            providers: vec![ProviderConfig::mock("mock")],
        }
    }
}

/// 服务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 单个流的截止时间（秒）
    pub stream_timeout_secs: u64,
    /// 请求体上限（字节）
    pub max_request_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8999,
            stream_timeout_secs: 300,
            max_request_bytes: 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    /// 监听地址 `host:port`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing 过滤指令，例如 `info` 或 `streamcast_lib=debug`
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Provider 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Mock,
}

/// 单个 Provider 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// 模型名称（注册表键）
    pub name: String,
    pub kind: ProviderKind,
    /// 完整端点 URL，缺省为 OpenAI 官方端点
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// 存放密钥的环境变量名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// HTTP/HTTPS 代理
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// mock 逐字符延迟（毫秒）
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_delay_ms() -> u64 {
    20
}

impl ProviderConfig {
    pub fn mock(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ProviderKind::Mock,
            endpoint: None,
            api_key: None,
            api_key_env: None,
            proxy: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            delay_ms: default_delay_ms(),
        }
    }

    /// 解析密钥：字面量优先，其次环境变量，都没有时为空（Provider 不可用）
    pub fn resolve_api_key(&self) -> String {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            return key.to_string();
        }
        self.api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .unwrap_or_default()
    }

    /// 构造 Provider
    pub fn build_provider(&self) -> Result<Arc<dyn ModelProvider>, ConfigError> {
        match self.kind {
            ProviderKind::Mock => Ok(Arc::new(
                MockProvider::new(&self.name).with_delay(Duration::from_millis(self.delay_ms)),
            )),
            ProviderKind::OpenAi => {
                let client = HttpClientFactory::new()
                    .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs))
                    .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
                    .create_client(self.proxy.as_deref())?;

                let api_key = self.resolve_api_key();
                if api_key.is_empty() {
                    tracing::warn!("[REGISTRY] 模型 {} 未配置密钥，将标记为不可用", self.name);
                }

                let mut provider = OpenAiProvider::new(api_key, client);
                if let Some(endpoint) = &self.endpoint {
                    provider = provider.with_endpoint(endpoint.as_str());
                }
                Ok(Arc::new(provider))
            }
        }
    }
}

impl Config {
    /// 按加载顺序读取配置
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var(CONFIG_ENV).ok().filter(|p| !p.is_empty());
        match resolve_config_path(explicit, env_path, default_config_path()) {
            Some(path) => {
                tracing::info!("加载配置文件: {}", path.display());
                Self::from_file(&path)
            }
            None => {
                tracing::info!("未找到配置文件，使用默认配置");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.stream_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "server.stream_timeout_secs 必须大于 0".to_string(),
            ));
        }
        if self.server.max_request_bytes == 0 {
            return Err(ConfigError::Validation(
                "server.max_request_bytes 必须大于 0".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(ConfigError::Validation("provider 名称不能为空".to_string()));
            }
            if !names.insert(provider.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "provider 名称重复: {}",
                    provider.name
                )));
            }
        }
        Ok(())
    }

    /// 构造模型注册表
    pub fn build_registry(&self) -> Result<ModelRegistry, ConfigError> {
        let registry = ModelRegistry::new();
        for provider in &self.providers {
            registry.register(provider.name.clone(), provider.build_provider()?);
        }
        Ok(registry)
    }
}

/// 默认配置文件路径 `~/.streamcast/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".streamcast").join("config.yaml"))
}

/// 显式路径和环境变量路径总是返回（不存在时由读取报错）；默认路径仅在存在时返回
fn resolve_config_path(
    explicit: Option<&Path>,
    env_path: Option<String>,
    default_path: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env_path {
        return Some(PathBuf::from(path));
    }
    default_path.filter(|p| p.exists())
}
