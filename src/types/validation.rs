//! Inbound request validation — range checks on `ChatCompletionRequest`.

use super::chat_request::ChatCompletionRequest;
use crate::error::RouterError;

/// Validate the OpenAI-compatible parameter ranges from spec §6.
///
/// Returns `RouterError::ValidationError` on the first violation found.
pub fn validate_request(req: &ChatCompletionRequest) -> Result<(), RouterError> {
    if req.messages.is_empty() {
        return Err(RouterError::ValidationError("messages must not be empty".into()));
    }
    check_range("temperature", req.temperature, 0.0, 2.0)?;
    check_range("top_p", req.top_p, 0.0, 1.0)?;
    check_range("frequency_penalty", req.frequency_penalty, -2.0, 2.0)?;
    check_range("presence_penalty", req.presence_penalty, -2.0, 2.0)?;
    if let Some(max_tokens) = req.max_tokens {
        if !(1..=128_000).contains(&max_tokens) {
            return Err(RouterError::ValidationError(format!(
                "max_tokens {max_tokens} out of range [1, 128000]"
            )));
        }
    }
    if let Some(rate) = req.min_success_rate {
        if !(0.0..=1.0).contains(&rate) {
            return Err(RouterError::ValidationError(format!(
                "min_success_rate {rate} out of range [0, 1]"
            )));
        }
    }
    if let Some(timeout) = req.timeout_secs {
        if timeout == 0 || timeout > 600 {
            return Err(RouterError::ValidationError(format!(
                "timeout_secs {timeout} out of range (0, 600]"
            )));
        }
    }
    Ok(())
}

fn check_range(field: &str, value: Option<f32>, min: f32, max: f32) -> Result<(), RouterError> {
    if let Some(v) = value {
        if v < min || v > max {
            return Err(RouterError::ValidationError(format!(
                "{field} {v} out of range [{min}, {max}]"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::message::Message;

    fn base_request() -> ChatCompletionRequest {
        ChatCompletionRequest {
            messages: vec![Message::user("hi")],
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
    fn empty_messages_rejected() {
        let mut req = base_request();
        req.messages.clear();
        assert!(validate_request(&req).is_err());
    }

    #[test]
    fn temperature_out_of_range_rejected() {
        let mut req = base_request();
        req.temperature = Some(2.5);
        assert!(validate_request(&req).is_err());
    }

    #[test]
    fn max_tokens_zero_rejected() {
        let mut req = base_request();
        req.max_tokens = Some(0);
        assert!(validate_request(&req).is_err());
    }

    #[test]
    fn timeout_over_600_rejected() {
        let mut req = base_request();
        req.timeout_secs = Some(601);
        assert!(validate_request(&req).is_err());
    }

    #[test]
    fn valid_request_passes() {
        let mut req = base_request();
        req.temperature = Some(0.7);
        req.max_tokens = Some(512);
        req.timeout_secs = Some(30);
        assert!(validate_request(&req).is_ok());
    }
}
