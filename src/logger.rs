//! 日志模块
//!
//! 初始化 tracing 订阅器，并提供日志脱敏。
use std::sync::OnceLock;

use regex::Regex;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// 初始化全局日志订阅器，`RUST_LOG` 优先于配置的级别
///
/// 重复调用时保留第一次安装的订阅器。
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();

    if installed.is_err() {
        tracing::debug!("日志订阅器已存在，跳过初始化");
    }
}

fn sanitize_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // Bearer token
            (r"Bearer\s+[A-Za-z0-9._-]+", "Bearer ***"),
            // OpenAI 风格的密钥
            (r"\bsk-[A-Za-z0-9_-]{8,}", "sk-***"),
            (
                r#"api[_-]?key["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
                "api_key: ***",
            ),
            (
                r#"access[_-]?token["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
                "access_token: ***",
            ),
            (r#"token["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#, "token: ***"),
            (
                r#"[Aa]uthorization["']?\s*[:=]\s*["']?[A-Za-z0-9._\s-]+"#,
                "authorization: ***",
            ),
            (
                r#"secret["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
                "secret: ***",
            ),
        ]
        .into_iter()
        .filter_map(|(pattern, replacement)| {
            Regex::new(pattern).ok().map(|re| (re, replacement))
        })
        .collect()
    })
}

/// 日志脱敏：上游错误 body 等可能携带凭证的文本在写日志前经过这里
pub fn sanitize_log_message(message: &str) -> String {
    let mut sanitized = message.to_string();
    for (re, replacement) in sanitize_patterns() {
        sanitized = re.replace_all(&sanitized, *replacement).into_owned();
    }
    sanitized
}
