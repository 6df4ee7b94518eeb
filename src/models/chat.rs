//! 聊天请求/响应模型
//!
//! OpenAI Chat Completions 兼容的请求体和流式 delta 结构。

use serde::{Deserialize, Serialize};

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// 聊天消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// 聊天请求
///
/// 消息顺序即对话历史，序列化时保持原顺序。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// 创建流式请求
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: true,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// 获取最后一条 user 消息
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
    }
}

/// 流式响应 delta
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

/// 单个 choice
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub delta: ChatDelta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// 内容增量
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatDelta {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatResponse {
    /// 第一个 choice 的非空内容
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.delta.content.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// 第一个 choice 的非空结束原因
    pub fn first_finish_reason(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.finish_reason.as_deref())
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization_keeps_order() {
        let request = ChatRequest::new(
            "deepseek-chat",
            vec![
                ChatMessage::system("你是一个编辑助手"),
                ChatMessage::user("第一问"),
                ChatMessage::assistant("第一答"),
                ChatMessage::user("第二问"),
            ],
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], true);
        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());

        let roles: Vec<&str> = json["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(request.last_user_message(), Some("第二问"));
    }

    #[test]
    fn test_request_optional_params() {
        let request = ChatRequest::new("gpt-4", vec![ChatMessage::user("hi")])
            .with_temperature(0.5)
            .with_max_tokens(256);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["temperature"], 0.5);
        assert_eq!(json["max_tokens"], 256);
    }

    #[test]
    fn test_response_delta_parsing() {
        let data = r#"{"id":"chatcmpl-1","model":"gpt-4","created":1700000000,"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        let response: ChatResponse = serde_json::from_str(data).unwrap();
        assert_eq!(response.first_content(), Some("Hello"));
        assert_eq!(response.first_finish_reason(), None);

        let data = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        let response: ChatResponse = serde_json::from_str(data).unwrap();
        assert_eq!(response.first_content(), None);
        assert_eq!(response.first_finish_reason(), Some("stop"));
    }
}
