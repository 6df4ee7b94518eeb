//! HTTP 客户端工厂
//!
//! 为上游 Provider 创建 reqwest 客户端，统一连接/请求超时，支持可选的 HTTP/HTTPS 代理。

use reqwest::{Client, Proxy};
use std::time::Duration;
use thiserror::Error;

/// 代理协议类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyProtocol {
    /// HTTP 代理
    Http,
    /// HTTPS 代理
    Https,
}

impl ProxyProtocol {
    /// 从 URL 字符串解析代理协议
    pub fn from_url(url: &str) -> Option<Self> {
        let url_lower = url.to_lowercase();
        if url_lower.starts_with("http://") {
            Some(ProxyProtocol::Http)
        } else if url_lower.starts_with("https://") {
            Some(ProxyProtocol::Https)
        } else {
            None
        }
    }
}

/// 客户端创建错误
#[derive(Debug, Error)]
pub enum ClientError {
    /// 无效的代理 URL
    #[error("无效的代理 URL: {0}")]
    InvalidProxy(String),

    /// 不支持的代理协议
    #[error("不支持的代理协议: {0}")]
    UnsupportedProtocol(String),

    /// 客户端构建错误
    #[error("客户端构建错误: {0}")]
    Build(String),
}

/// HTTP 客户端工厂
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    /// 连接超时时间
    connect_timeout: Duration,
    /// 整体请求超时时间（包含流式读取）
    request_timeout: Duration,
}

impl Default for HttpClientFactory {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl HttpClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置连接超时时间
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// 设置请求超时时间
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// 解析代理 URL 并返回协议类型
    pub fn parse_proxy_url(url: &str) -> Result<ProxyProtocol, ClientError> {
        if url.trim().is_empty() {
            return Err(ClientError::InvalidProxy("代理 URL 不能为空".to_string()));
        }

        ProxyProtocol::from_url(url).ok_or_else(|| ClientError::UnsupportedProtocol(url.to_string()))
    }

    /// 创建 HTTP 客户端，`proxy` 为空时直连
    pub fn create_client(&self, proxy: Option<&str>) -> Result<Client, ClientError> {
        let mut builder = Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout);

        if let Some(url) = proxy {
            Self::parse_proxy_url(url)?;
            let proxy = Proxy::all(url).map_err(|e| ClientError::InvalidProxy(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        builder.build().map_err(|e| ClientError::Build(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_protocol_from_url() {
        assert_eq!(
            ProxyProtocol::from_url("http://proxy.example.com:8080"),
            Some(ProxyProtocol::Http)
        );
        assert_eq!(
            ProxyProtocol::from_url("HTTPS://secure-proxy.example.com:443"),
            Some(ProxyProtocol::Https)
        );
        assert_eq!(ProxyProtocol::from_url("ftp://invalid.com"), None);
        assert_eq!(ProxyProtocol::from_url("invalid-url"), None);
    }

    #[test]
    fn test_parse_proxy_url_invalid() {
        assert!(matches!(
            HttpClientFactory::parse_proxy_url("   "),
            Err(ClientError::InvalidProxy(_))
        ));
        assert!(matches!(
            HttpClientFactory::parse_proxy_url("ftp://invalid.com"),
            Err(ClientError::UnsupportedProtocol(_))
        ));
    }

    #[test]
    fn test_create_client() {
        let factory = HttpClientFactory::new().with_request_timeout(Duration::from_secs(5));
        assert!(factory.create_client(None).is_ok());
        assert!(factory
            .create_client(Some("http://proxy.example.com:8080"))
            .is_ok());
        assert!(matches!(
            factory.create_client(Some("ftp://invalid.proxy:21")),
            Err(ClientError::UnsupportedProtocol(_))
        ));
    }
}
