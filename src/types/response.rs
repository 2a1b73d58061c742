//! Outbound chat-completion response and streaming chunk DTOs.

use serde::{Deserialize, Serialize};

use super::message::Message;
use super::tool::ToolCall;

/// Token usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    #[default]
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

/// Per-attempt error recorded in `_router.errors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptError {
    pub provider: String,
    pub model: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

/// Router-specific metadata attached to every response under `_router`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterMetadata {
    pub provider: String,
    pub model_name: String,
    pub attempts: usize,
    pub fallback_used: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<AttemptError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChoice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: FinishReason,
}

/// Non-streaming `POST /chat/completions` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    pub usage: Usage,
    #[serde(rename = "_router")]
    pub router: RouterMetadata,
}

impl ChatCompletionResponse {
    pub fn object_kind() -> &'static str {
        "chat.completion"
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// One `data: <json>\n\n` SSE frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
    #[serde(rename = "_router", default, skip_serializing_if = "Option::is_none")]
    pub router: Option<RouterMetadata>,
}

impl ChatCompletionChunk {
    pub fn object_kind() -> &'static str {
        "chat.completion.chunk"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_metadata_omits_empty_errors_and_data() {
        let meta = RouterMetadata {
            provider: "openrouter".into(),
            model_name: "m1".into(),
            attempts: 1,
            fallback_used: false,
            errors: Vec::new(),
            data: None,
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(!json.contains("errors"));
        assert!(!json.contains("data"));
    }

    #[test]
    fn response_serializes_router_under_underscore_key() {
        let resp = ChatCompletionResponse {
            id: "chatcmpl-1".into(),
            object: ChatCompletionResponse::object_kind().into(),
            created: 0,
            model: "m1".into(),
            choices: vec![],
            usage: Usage::default(),
            router: RouterMetadata {
                provider: "openrouter".into(),
                model_name: "m1".into(),
                attempts: 1,
                fallback_used: false,
                errors: Vec::new(),
                data: None,
            },
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("_router").is_some());
    }
}
