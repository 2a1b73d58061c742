//! The provider capability trait a transport layer's adapters implement.
//!
//! A single unary+streaming capability trait for the one thing this crate
//! actually routes: chat completions.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::Result;
use crate::types::{FinishReason, Message, ToolChoice, ToolDefinition, Usage};

/// Provider-neutral parameters for one chat completion call, produced by
/// [`crate::request_builder`].
#[derive(Debug, Clone)]
pub struct ProviderCallParams {
    pub messages: Vec<Message>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub tool_choice: Option<ToolChoice>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub stop: Option<Vec<String>>,
    pub json_response: bool,
}

/// Result of a single non-streaming provider call.
#[derive(Debug, Clone)]
pub struct ProviderChatResult {
    pub message: Message,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

/// One unit of a streamed chat completion.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    Content(String),
    ToolCallStart { index: usize, id: String, name: String },
    ToolCallDelta { index: usize, arguments: String },
    Usage(Usage),
    Done { finish_reason: FinishReason },
}

/// Implemented by each upstream adapter (OpenRouter, DeepSeek, Ollama, ...).
/// The Router dispatches to whichever adapter `ModelDefinition.provider`
/// names; adapter lookup/registration is a transport-layer concern.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Non-streaming chat completion against `model_id` (the provider's own
    /// identifier, not the routing-level model name).
    async fn chat(&self, model_id: &str, params: &ProviderCallParams) -> Result<ProviderChatResult>;

    /// Streaming chat completion.
    async fn chat_stream(
        &self,
        model_id: &str,
        params: &ProviderCallParams,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<ChatEvent>> + Send>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_call_params_defaults_are_permissive() {
        let params = ProviderCallParams {
            messages: vec![],
            tools: None,
            tool_choice: None,
            temperature: None,
            max_tokens: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            stop: None,
            json_response: false,
        };
        assert!(params.tools.is_none());
        assert!(!params.json_response);
    }
}
