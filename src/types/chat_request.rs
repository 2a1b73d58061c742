//! Inbound chat-completion request DTO — the OpenAI-compatible body extended
//! with router-specific fields.

use serde::{Deserialize, Serialize};

use super::message::Message;
use super::model::ModelKind;
use super::tool::{ToolChoice, ToolDefinition};

/// `model` accepts either a single string or a priority list.
///
/// The literal `"auto"` (alone, or as a list entry) enables criteria-based
/// fallback once the priority list is exhausted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelSelector {
    Single(String),
    Priority(Vec<String>),
}

impl ModelSelector {
    /// Split into an ordered priority list (provider-qualified names kept
    /// verbatim) and whether criteria-based auto-fallback is allowed.
    pub fn into_priority_list(self) -> (Vec<String>, bool) {
        match self {
            ModelSelector::Single(s) if s == "auto" => (Vec::new(), true),
            ModelSelector::Single(s) => (vec![s], false),
            ModelSelector::Priority(list) => {
                let allow_auto = list.iter().any(|s| s == "auto");
                let names = list.into_iter().filter(|s| s != "auto").collect();
                (names, allow_auto)
            }
        }
    }
}

/// `POST {basePath}/chat/completions` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub frequency_penalty: Option<f32>,
    #[serde(default)]
    pub presence_penalty: Option<f32>,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
    #[serde(default)]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(default)]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default)]
    pub stream: bool,

    // Router-specific fields.
    #[serde(default)]
    pub model: Option<ModelSelector>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default, rename = "type")]
    pub model_type: Option<ModelKind>,
    #[serde(default)]
    pub min_context_size: Option<usize>,
    #[serde(default)]
    pub json_response: Option<bool>,
    #[serde(default)]
    pub prefer_fast: Option<bool>,
    #[serde(default)]
    pub min_success_rate: Option<f64>,
    #[serde(default)]
    pub supports_vision: Option<bool>,
    #[serde(default)]
    pub max_model_switches: Option<u32>,
    #[serde(default)]
    pub max_same_model_retries: Option<u32>,
    #[serde(default)]
    pub retry_delay: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub fallback_provider: Option<String>,
    #[serde(default)]
    pub fallback_model: Option<String>,
}
