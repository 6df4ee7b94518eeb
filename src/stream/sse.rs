//! SSE 帧编解码
//!
//! # 解码
//!
//! 按行解析上游 SSE 文本：
//! ```text
//! data: {"id":"chatcmpl-xxx","model":"gpt-4","created":1,"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}
//!
//! data: [DONE]
//! ```
//!
//! 无法解析的 `data:` 行会被静默跳过。网络分块可能把一行拆到两次读取里，
//! 解析失败不视为错误。
//!
//! # 编码
//!
//! - 原始数据模式：`data: <payload>\n\n`，不转义、不拆分内嵌换行
//! - 结构化消息模式：`id:` / `event:` / 多行 `data:` / `retry:`，以空行结束

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::models::chat::ChatResponse;
use crate::stream::events::StreamEvent;
use crate::streaming::StreamError;

/// `data:` 前缀（严格匹配，含一个空格）
pub const DATA_PREFIX: &str = "data: ";

/// 上游结束标记
pub const DONE_SENTINEL: &str = "[DONE]";

/// 单行解码结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// 无输出，继续读取
    Skip,
    /// 收到 `[DONE]`，停止读取
    Done,
    /// 产生一个事件
    Event(StreamEvent),
}

/// 解码一行上游文本（调用方负责按行切分）
pub fn decode_line(line: &str) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() {
        return LineOutcome::Skip;
    }

    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return LineOutcome::Skip;
    };

    if data == DONE_SENTINEL {
        return LineOutcome::Done;
    }

    let response: ChatResponse = match serde_json::from_str(data) {
        Ok(response) => response,
        Err(e) => {
            tracing::trace!("[SSE] 跳过无法解析的数据行: {}", e);
            return LineOutcome::Skip;
        }
    };

    match response.first_content() {
        Some(content) => LineOutcome::Event(StreamEvent::Payload {
            data: Bytes::copy_from_slice(content.as_bytes()),
            finish_reason: response.first_finish_reason().map(str::to_string),
        }),
        None => LineOutcome::Skip,
    }
}

/// 依次解码多行，遇到 `[DONE]` 立即停止
pub fn decode_lines<'a, I>(lines: I) -> Vec<StreamEvent>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut events = Vec::new();
    for line in lines {
        match decode_line(line) {
            LineOutcome::Skip => {}
            LineOutcome::Done => break,
            LineOutcome::Event(event) => events.push(event),
        }
    }
    events
}

/// 增量 SSE 解码器
///
/// 缓存跨 chunk 的半行数据，按 `\n` 切分后逐行解码。
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 是否已收到 `[DONE]`
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// 处理一个字节块，返回解码出的事件
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }

        self.buf.extend_from_slice(chunk);
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            self.decode_raw_line(&line, &mut events);
            if self.done {
                self.buf.clear();
                break;
            }
        }
        events
    }

    /// 上游读完后处理残留的最后一行（没有换行结尾）
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.done || self.buf.is_empty() {
            return events;
        }
        let line = std::mem::take(&mut self.buf);
        self.decode_raw_line(&line, &mut events);
        events
    }

    fn decode_raw_line(&mut self, line: &[u8], events: &mut Vec<StreamEvent>) {
        let text = String::from_utf8_lossy(line);
        match decode_line(&text) {
            LineOutcome::Skip => {}
            LineOutcome::Done => self.done = true,
            LineOutcome::Event(event) => events.push(event),
        }
    }
}

/// 原始数据模式编码：`data: <payload>\n\n`
pub fn encode_data(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + DATA_PREFIX.len() + 2);
    buf.put_slice(DATA_PREFIX.as_bytes());
    buf.put_slice(payload);
    buf.put_slice(b"\n\n");
    buf.freeze()
}

/// 结构化 SSE 消息
///
/// JSON 信封字段名大小写不敏感（`id` / `ID` 均可）。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SseMessage {
    #[serde(default, alias = "ID", alias = "Id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, alias = "Event", skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(alias = "Data")]
    pub data: String,
    #[serde(default, alias = "Retry", skip_serializing_if = "Option::is_none")]
    pub retry: Option<u64>,
}

impl SseMessage {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_retry(mut self, retry: u64) -> Self {
        self.retry = Some(retry);
        self
    }

    /// 从 JSON 信封解析
    pub fn from_json(data: &[u8]) -> Result<Self, StreamError> {
        Ok(serde_json::from_slice(data)?)
    }

    /// 编码为 SSE 文本
    ///
    /// 固定顺序：id、event、每行一个 data、retry、空行。空字符串的 id/event 视为缺省。
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.data.len() + 32);

        if let Some(id) = self.id.as_deref().filter(|s| !s.is_empty()) {
            out.push_str("id: ");
            out.push_str(id);
            out.push('\n');
        }

        if let Some(event) = self.event.as_deref().filter(|s| !s.is_empty()) {
            out.push_str("event: ");
            out.push_str(event);
            out.push('\n');
        }

        for line in self.data.split('\n') {
            out.push_str(DATA_PREFIX);
            out.push_str(line);
            out.push('\n');
        }

        if let Some(retry) = self.retry {
            out.push_str(&format!("retry: {}\n", retry));
        }

        out.push('\n');
        out
    }
}

/// 原始数据模式处理器
pub fn sse_data_processor(data: Bytes) -> Result<Bytes, StreamError> {
    Ok(encode_data(&data))
}

/// 结构化消息模式处理器，payload 须为 JSON 信封
pub fn sse_message_processor(data: Bytes) -> Result<Bytes, StreamError> {
    let message = SseMessage::from_json(&data)?;
    Ok(Bytes::from(message.encode()))
}
