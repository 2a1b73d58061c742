//! Pure translation from the inbound DTO to provider-neutral call
//! parameters: `From`/free functions doing nothing but field mapping, no
//! control flow.

use crate::provider::ProviderCallParams;
use crate::types::{ChatCompletionRequest, Message};

/// Whether any message carries image content — the Router uses this to
/// auto-inject `supports_vision = true` into the selection criteria
/// vision-capable routing.
pub fn has_image_content(messages: &[Message]) -> bool {
    crate::types::message::has_image_content(messages)
}

/// Build provider call parameters from the inbound request. Pure mapping;
/// the Router, not this function, handles model selection, retries, or
/// anything stateful.
pub fn build_provider_params(req: &ChatCompletionRequest) -> ProviderCallParams {
    ProviderCallParams {
        messages: req.messages.clone(),
        tools: req.tools.clone(),
        tool_choice: req.tool_choice.clone(),
        temperature: req.temperature,
        max_tokens: req.max_tokens,
        top_p: req.top_p,
        frequency_penalty: req.frequency_penalty,
        presence_penalty: req.presence_penalty,
        stop: req.stop.clone(),
        json_response: req.json_response.unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentPart, ImageUrl, MessageContent, Role};

    fn base_request(messages: Vec<Message>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            messages,
            temperature: None,
            max_tokens: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            stop: None,
            tools: None,
            tool_choice: None,
            stream: false,
            model: None,
            tags: None,
            model_type: None,
            min_context_size: None,
            json_response: None,
            prefer_fast: None,
            min_success_rate: None,
            supports_vision: None,
            max_model_switches: None,
            max_same_model_retries: None,
            retry_delay: None,
            timeout_secs: None,
            fallback_provider: None,
            fallback_model: None,
        }
    }

    #[test]
    fn plain_text_request_has_no_image() {
        let req = base_request(vec![Message::user("hello")]);
        assert!(!has_image_content(&req.messages));
    }

    #[test]
    fn image_part_is_detected() {
        let msg = Message {
            role: Role::User,
            content: MessageContent::Parts(vec![ContentPart::ImageUrl {
                image_url: ImageUrl { url: "https://x/y.png".into(), detail: None },
            }]),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        };
        let req = base_request(vec![msg]);
        assert!(has_image_content(&req.messages));
    }

    #[test]
    fn json_response_defaults_to_false() {
        let req = base_request(vec![Message::user("hi")]);
        let params = build_provider_params(&req);
        assert!(!params.json_response);
    }

    #[test]
    fn params_carry_sampling_parameters_through() {
        let mut req = base_request(vec![Message::user("hi")]);
        req.temperature = Some(0.7);
        req.max_tokens = Some(256);
        let params = build_provider_params(&req);
        assert_eq!(params.temperature, Some(0.7));
        assert_eq!(params.max_tokens, Some(256));
    }
}
