//! The orchestrator: negotiates Selector, Rate Limiter, Circuit Breaker, a
//! Provider adapter, and the Retry Handler until success, exhaustion,
//! cancellation, or fallback.
//!
//! Follows a try-in-priority-order-until-one-succeeds shape, generalized
//! from a static provider list to a selection/rate-limit/attempt/record
//! loop over a dynamic model registry.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::circuit_breaker::CircuitBreaker;
use crate::config::RoutingConfig;
use crate::error::CancelReason;
use crate::provider::{ChatEvent, ChatProvider, ProviderCallParams};
use crate::rate_limit::RateLimiter;
use crate::registry::{ModelRegistry, SelectionCriteria};
use crate::request_builder::{build_provider_params, has_image_content};
use crate::retry::{execute_with_retry, RetryPolicy};
use crate::selector::Selector;
use crate::state::StateStore;
use crate::telemetry;
use crate::types::{
    AttemptError, ChatCompletionChoice, ChatCompletionRequest, ChatCompletionResponse,
    ModelDefinition, RouterMetadata, Usage,
};
use crate::{Result, RouterError};

/// Resolves a `ModelDefinition.provider` name to the adapter that serves it.
/// A transport layer registers one entry per configured upstream.
pub trait ProviderResolver: Send + Sync {
    fn resolve(&self, provider_name: &str) -> Option<Arc<dyn ChatProvider>>;
}

/// The trivial, map-backed [`ProviderResolver`] implementation.
#[derive(Default)]
pub struct ProviderMap(HashMap<String, Arc<dyn ChatProvider>>);

impl ProviderMap {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn insert(&mut self, provider_name: impl Into<String>, provider: Arc<dyn ChatProvider>) {
        self.0.insert(provider_name.into(), provider);
    }
}

impl ProviderResolver for ProviderMap {
    fn resolve(&self, provider_name: &str) -> Option<Arc<dyn ChatProvider>> {
        self.0.get(provider_name).cloned()
    }
}

/// Composes the registry, state store, circuit breaker, rate limiter,
/// selector, and provider resolver into the request-handling orchestrator.
pub struct Router {
    registry: Arc<ModelRegistry>,
    store: Arc<dyn StateStore>,
    breaker: Arc<CircuitBreaker>,
    limiter: Arc<RateLimiter>,
    selector: Arc<Selector>,
    providers: Arc<dyn ProviderResolver>,
    config: RoutingConfig,
}

/// Outcome of a non-streaming attempt loop iteration: the model name is
/// already known by the caller, only the provider call result matters here.
struct AttemptOutcome {
    message: crate::types::Message,
    finish_reason: crate::types::FinishReason,
    usage: Usage,
    latency_ms: u64,
}

impl Router {
    pub fn new(
        registry: Arc<ModelRegistry>,
        store: Arc<dyn StateStore>,
        breaker: Arc<CircuitBreaker>,
        limiter: Arc<RateLimiter>,
        selector: Arc<Selector>,
        providers: Arc<dyn ProviderResolver>,
        config: RoutingConfig,
    ) -> Self {
        Self { registry, store, breaker, limiter, selector, providers, config }
    }

    fn build_criteria(&self, req: &ChatCompletionRequest) -> SelectionCriteria {
        let mut criteria = SelectionCriteria {
            tags: req.tags.clone(),
            model_type: req.model_type,
            min_context_size: req.min_context_size,
            json_response: req.json_response,
            prefer_fast: req.prefer_fast.unwrap_or(false),
            min_success_rate: req.min_success_rate,
            supports_vision: req.supports_vision,
            ..Default::default()
        };
        if has_image_content(&req.messages) {
            criteria.supports_vision = Some(true);
        }
        criteria
    }

    async fn resolve_priority_entry(
        &self,
        name: &str,
    ) -> Result<std::result::Result<Arc<ModelDefinition>, AttemptError>> {
        let (bare, provider) = match name.split_once('/') {
            Some((provider, bare)) => (bare, Some(provider)),
            None => (name, None),
        };
        let Some(model) = self.registry.find_by_name_and_provider(bare, provider) else {
            return Ok(Err(AttemptError {
                provider: provider.unwrap_or_default().to_string(),
                model: name.to_string(),
                error: "unknown model".to_string(),
                code: None,
            }));
        };
        if !model.available || !self.breaker.can_request(&model.name).await? {
            return Ok(Err(AttemptError {
                provider: model.provider.clone(),
                model: model.name.clone(),
                error: "model not admitted (unavailable or circuit open)".to_string(),
                code: None,
            }));
        }
        Ok(Ok(model))
    }

    async fn attempt_model(
        &self,
        model: &ModelDefinition,
        params: &ProviderCallParams,
        max_retries: u32,
        retry_delay_ms: u64,
        cancel: &CancellationToken,
    ) -> Result<AttemptOutcome> {
        let Some(provider) = self.providers.resolve(&model.provider) else {
            return Err(RouterError::ProviderNotFound(model.provider.clone()));
        };
        let model_id = model.model_id.clone();
        let model_name = model.name.clone();
        let provider_name = model.provider.clone();
        let retry_model_name = model_name.clone();

        let policy = RetryPolicy {
            max_retries,
            retry_delay_ms,
            should_retry: |err: &RouterError| err.is_transient(),
            on_retry: Some(move |attempt: u32, err: &RouterError| {
                metrics::counter!(telemetry::RETRIES_TOTAL, "model" => retry_model_name.clone())
                    .increment(1);
                debug!(attempt, error = %err, "retrying same model");
            }),
        };

        let start = Instant::now();
        let result = execute_with_retry(policy, cancel, |_attempt| {
            let provider = provider.clone();
            let model_id = model_id.clone();
            let model_name = model_name.clone();
            let provider_name = provider_name.clone();
            async move {
                let attempt_start = Instant::now();
                let outcome = provider.chat(&model_id, params).await;
                metrics::histogram!(telemetry::ATTEMPT_DURATION_SECONDS,
                    "model" => model_name,
                    "provider" => provider_name,
                )
                .record(attempt_start.elapsed().as_secs_f64());
                outcome
            }
        })
        .await?;

        Ok(AttemptOutcome {
            message: result.message,
            finish_reason: result.finish_reason,
            usage: result.usage,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn build_response(
        &self,
        model: &ModelDefinition,
        outcome: AttemptOutcome,
        attempts: usize,
        fallback_used: bool,
        errors: Vec<AttemptError>,
        json_response_requested: bool,
    ) -> ChatCompletionResponse {
        let data = json_response_requested
            .then(|| outcome.message.content.as_text())
            .flatten()
            .and_then(|text| serde_json::from_str::<serde_json::Value>(text).ok());

        ChatCompletionResponse {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            object: ChatCompletionResponse::object_kind().to_string(),
            created: crate::state::now_ms() / 1000,
            model: model.name.clone(),
            choices: vec![ChatCompletionChoice {
                index: 0,
                message: outcome.message,
                finish_reason: outcome.finish_reason,
            }],
            usage: outcome.usage,
            router: RouterMetadata {
                provider: model.provider.clone(),
                model_name: model.name.clone(),
                attempts,
                fallback_used,
                errors,
                data,
            },
        }
    }

    /// Non-streaming `POST /chat/completions`.
    pub async fn route(
        &self,
        req: &ChatCompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionResponse> {
        if cancel.is_cancelled() {
            record_cancellation(CancelReason::Shutdown);
            return Err(RouterError::RequestCancelled(CancelReason::Shutdown));
        }

        let criteria = self.build_criteria(req);
        let params = build_provider_params(req);
        let (mut priority_list, allow_auto) =
            req.model.clone().map(|m| m.into_priority_list()).unwrap_or((Vec::new(), true));

        let max_model_switches = req.max_model_switches.unwrap_or(self.config.max_model_switches);
        let max_same_model_retries =
            req.max_same_model_retries.unwrap_or(self.config.max_same_model_retries);
        let retry_delay_ms = req.retry_delay.unwrap_or(self.config.retry_delay_ms);

        let mut attempt_list: Vec<String> = Vec::new();
        let mut errors: Vec<AttemptError> = Vec::new();
        let mut model_switches: u32 = 0;

        'selection: while model_switches <= max_model_switches {
            if cancel.is_cancelled() {
                record_cancellation(CancelReason::Shutdown);
                return Err(RouterError::RequestCancelled(CancelReason::Shutdown));
            }

            let model = if !priority_list.is_empty() {
                let name = priority_list.remove(0);
                match self.resolve_priority_entry(&name).await? {
                    Ok(model) => model,
                    Err(err) => {
                        errors.push(err);
                        model_switches += 1;
                        record_model_switch("permanent");
                        continue 'selection;
                    }
                }
            } else if allow_auto {
                match self.selector.select_next_model(&criteria, &attempt_list).await? {
                    Some(model) => model,
                    None => break 'selection,
                }
            } else {
                break 'selection;
            };

            attempt_list.push(model.name.clone());

            if !self.limiter.check_model(&model.name).await? {
                metrics::counter!(telemetry::RATE_LIMITED_TOTAL, "model" => model.name.clone())
                    .increment(1);
                errors.push(AttemptError {
                    provider: model.provider.clone(),
                    model: model.name.clone(),
                    error: "rate limit exceeded".to_string(),
                    code: Some(429),
                });
                model_switches += 1;
                record_model_switch("rate_limited");
                continue 'selection;
            }

            match self
                .attempt_model(&model, &params, max_same_model_retries, retry_delay_ms, cancel)
                .await
            {
                Ok(outcome) => {
                    self.breaker.on_success(&model.name, outcome.latency_ms).await?;
                    record_request_outcome(&model.name, &model.provider, "ok");
                    return Ok(self.build_response(
                        &model,
                        outcome,
                        attempt_list.len(),
                        false,
                        errors,
                        req.json_response.unwrap_or(false),
                    ));
                }
                Err(RouterError::RequestCancelled(reason)) => {
                    record_cancellation(reason);
                    return Err(RouterError::RequestCancelled(reason));
                }
                Err(err) => {
                    let code = status_code_of(&err);
                    self.breaker.on_failure(&model.name, code, None).await?;
                    errors.push(AttemptError {
                        provider: model.provider.clone(),
                        model: model.name.clone(),
                        error: err.to_string(),
                        code,
                    });
                    model_switches += 1;
                    record_model_switch("transient_exhausted");
                }
            }
        }

        if self.config.fallback_enabled {
            if let (Some(provider_name), Some(model_name)) =
                (&self.config.fallback_provider, &self.config.fallback_model)
            {
                let already_tried = attempt_list.iter().any(|n| n == model_name);
                if !already_tried {
                    if let Some(model) = self
                        .registry
                        .find_by_name_and_provider(model_name, Some(provider_name.as_str()))
                    {
                        if model.available && self.breaker.can_request(&model.name).await? {
                            attempt_list.push(model.name.clone());
                            match self
                                .attempt_model(
                                    &model,
                                    &params,
                                    max_same_model_retries,
                                    retry_delay_ms,
                                    cancel,
                                )
                                .await
                            {
                                Ok(outcome) => {
                                    self.breaker.on_success(&model.name, outcome.latency_ms).await?;
                                    self.store.record_fallback_usage().await?;
                                    metrics::counter!(telemetry::FALLBACKS_TOTAL).increment(1);
                                    record_request_outcome(&model.name, &model.provider, "ok");
                                    return Ok(self.build_response(
                                        &model,
                                        outcome,
                                        attempt_list.len(),
                                        true,
                                        errors,
                                        req.json_response.unwrap_or(false),
                                    ));
                                }
                                Err(RouterError::RequestCancelled(reason)) => {
                                    record_cancellation(reason);
                                    return Err(RouterError::RequestCancelled(reason));
                                }
                                Err(err) => {
                                    let code = status_code_of(&err);
                                    self.breaker.on_failure(&model.name, code, None).await?;
                                    self.store.record_fallback_usage().await?;
                                    metrics::counter!(telemetry::FALLBACKS_TOTAL).increment(1);
                                    errors.push(AttemptError {
                                        provider: model.provider.clone(),
                                        model: model.name.clone(),
                                        error: err.to_string(),
                                        code,
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }

        metrics::counter!(telemetry::REQUESTS_TOTAL, "status" => "error").increment(1);
        Err(RouterError::AllModelsFailed { attempts: attempt_list.len(), errors })
    }

    /// Streaming `POST /chat/completions`. Identical selection/rate-limit
    /// mechanics to [`Self::route`]; once any chunk has been yielded from
    /// the provider, a mid-stream failure terminates the response rather
    /// than triggering a model switch.
    pub async fn route_stream(
        &self,
        req: &ChatCompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<(Arc<ModelDefinition>, RouterMetadata, Pin<Box<dyn Stream<Item = Result<ChatEvent>> + Send>>)>
    {
        if cancel.is_cancelled() {
            record_cancellation(CancelReason::Shutdown);
            return Err(RouterError::RequestCancelled(CancelReason::Shutdown));
        }

        let criteria = self.build_criteria(req);
        let params = build_provider_params(req);
        let (mut priority_list, allow_auto) =
            req.model.clone().map(|m| m.into_priority_list()).unwrap_or((Vec::new(), true));

        let max_model_switches = req.max_model_switches.unwrap_or(self.config.max_model_switches);
        let mut attempt_list: Vec<String> = Vec::new();
        let mut errors: Vec<AttemptError> = Vec::new();
        let mut model_switches: u32 = 0;

        loop {
            if model_switches > max_model_switches {
                metrics::counter!(telemetry::REQUESTS_TOTAL, "status" => "error").increment(1);
                return Err(RouterError::AllModelsFailed { attempts: attempt_list.len(), errors });
            }
            if cancel.is_cancelled() {
                record_cancellation(CancelReason::Shutdown);
                return Err(RouterError::RequestCancelled(CancelReason::Shutdown));
            }

            let model = if !priority_list.is_empty() {
                let name = priority_list.remove(0);
                match self.resolve_priority_entry(&name).await? {
                    Ok(model) => model,
                    Err(err) => {
                        errors.push(err);
                        model_switches += 1;
                        record_model_switch("permanent");
                        continue;
                    }
                }
            } else if allow_auto {
                match self.selector.select_next_model(&criteria, &attempt_list).await? {
                    Some(model) => model,
                    None => {
                        metrics::counter!(telemetry::REQUESTS_TOTAL, "status" => "error")
                            .increment(1);
                        return Err(RouterError::AllModelsFailed {
                            attempts: attempt_list.len(),
                            errors,
                        });
                    }
                }
            } else {
                metrics::counter!(telemetry::REQUESTS_TOTAL, "status" => "error").increment(1);
                return Err(RouterError::AllModelsFailed { attempts: attempt_list.len(), errors });
            };

            attempt_list.push(model.name.clone());

            if !self.limiter.check_model(&model.name).await? {
                metrics::counter!(telemetry::RATE_LIMITED_TOTAL, "model" => model.name.clone())
                    .increment(1);
                errors.push(AttemptError {
                    provider: model.provider.clone(),
                    model: model.name.clone(),
                    error: "rate limit exceeded".to_string(),
                    code: Some(429),
                });
                model_switches += 1;
                record_model_switch("rate_limited");
                continue;
            }

            let Some(provider) = self.providers.resolve(&model.provider) else {
                errors.push(AttemptError {
                    provider: model.provider.clone(),
                    model: model.name.clone(),
                    error: "provider not registered".to_string(),
                    code: None,
                });
                model_switches += 1;
                record_model_switch("permanent");
                continue;
            };

            match provider.chat_stream(&model.model_id, &params).await {
                Ok(stream) => {
                    let meta = RouterMetadata {
                        provider: model.provider.clone(),
                        model_name: model.name.clone(),
                        attempts: attempt_list.len(),
                        fallback_used: false,
                        errors: errors.clone(),
                        data: None,
                    };
                    let breaker = self.breaker.clone();
                    let name = model.name.clone();
                    let provider_name = model.provider.clone();
                    let start = Instant::now();
                    let guarded = guard_stream(stream, breaker, name, provider_name, start);
                    return Ok((model, meta, guarded));
                }
                Err(err) => {
                    let code = status_code_of(&err);
                    self.breaker.on_failure(&model.name, code, None).await?;
                    errors.push(AttemptError {
                        provider: model.provider.clone(),
                        model: model.name.clone(),
                        error: err.to_string(),
                        code,
                    });
                    model_switches += 1;
                    record_model_switch("transient_exhausted");
                }
            }
        }
    }
}

/// Wraps a provider's stream so the first successful `Usage`/`Done` event
/// records success and any error event records failure, without retrying
/// mid-stream.
fn guard_stream(
    stream: Pin<Box<dyn Stream<Item = Result<ChatEvent>> + Send>>,
    breaker: Arc<CircuitBreaker>,
    model_name: String,
    provider_name: String,
    start: Instant,
) -> Pin<Box<dyn Stream<Item = Result<ChatEvent>> + Send>> {
    Box::pin(stream.inspect(move |event| {
        let breaker = breaker.clone();
        let model_name = model_name.clone();
        let provider_name = provider_name.clone();
        let latency_ms = start.elapsed().as_millis() as u64;
        match event {
            Ok(ChatEvent::Done { .. }) => {
                metrics::histogram!(telemetry::ATTEMPT_DURATION_SECONDS,
                    "model" => model_name.clone(),
                    "provider" => provider_name.clone(),
                )
                .record(latency_ms as f64 / 1_000.0);
                record_request_outcome(&model_name, &provider_name, "ok");
                tokio::spawn(async move {
                    let _ = breaker.on_success(&model_name, latency_ms).await;
                });
            }
            Err(err) => {
                let code = status_code_of(err);
                metrics::histogram!(telemetry::ATTEMPT_DURATION_SECONDS,
                    "model" => model_name.clone(),
                    "provider" => provider_name.clone(),
                )
                .record(latency_ms as f64 / 1_000.0);
                record_request_outcome(&model_name, &provider_name, "error");
                tokio::spawn(async move {
                    let _ = breaker.on_failure(&model_name, code, Some(latency_ms)).await;
                });
            }
            _ => {}
        }
    }))
}

fn status_code_of(err: &RouterError) -> Option<u16> {
    match err {
        RouterError::Api { status, .. } => Some(*status),
        _ => None,
    }
}

fn record_request_outcome(model: &str, provider: &str, status: &'static str) {
    metrics::counter!(telemetry::REQUESTS_TOTAL,
        "model" => model.to_owned(),
        "provider" => provider.to_owned(),
        "status" => status,
    )
    .increment(1);
}

fn record_model_switch(reason: &'static str) {
    metrics::counter!(telemetry::MODEL_SWITCHES_TOTAL, "reason" => reason).increment(1);
}

fn cancel_reason_label(reason: CancelReason) -> &'static str {
    match reason {
        CancelReason::ClientDisconnect => "client_disconnect",
        CancelReason::Shutdown => "shutdown",
        CancelReason::Timeout => "timeout",
    }
}

fn record_cancellation(reason: CancelReason) {
    metrics::counter!(telemetry::CANCELLATIONS_TOTAL, "reason" => cancel_reason_label(reason))
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::config::RoutingConfig;
    use crate::provider::ProviderChatResult;
    use crate::rate_limit::RateLimiterConfig;
    use crate::state::memory::MemoryStateStore;
    use crate::types::{FinishReason, Message, ModelKind, ModelSpeed};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn model(name: &str, provider: &str) -> ModelDefinition {
        ModelDefinition {
            name: name.to_string(),
            provider: provider.to_string(),
            model_id: name.to_string(),
            kind: ModelKind::Fast,
            speed: ModelSpeed::Fast,
            context_size: 8_192,
            max_output_tokens: 4_096,
            tags: HashSet::new(),
            json_response: false,
            supports_image: false,
            supports_video: false,
            supports_audio: false,
            supports_file: false,
            supports_tools: false,
            supports_vision: false,
            available: true,
            weight: 1,
            priority: 1,
            max_concurrent: None,
        }
    }

    struct ScriptedProvider {
        name: String,
        /// Each call returns the next scripted result; the last entry repeats.
        results: Vec<Result<ProviderChatResult>>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn chat(
            &self,
            _model_id: &str,
            _params: &ProviderCallParams,
        ) -> Result<ProviderChatResult> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            let idx = idx.min(self.results.len() - 1);
            match &self.results[idx] {
                Ok(r) => Ok(r.clone()),
                Err(e) => Err(e.clone()),
            }
        }

        async fn chat_stream(
            &self,
            _model_id: &str,
            _params: &ProviderCallParams,
        ) -> Result<Pin<Box<dyn Stream<Item = Result<ChatEvent>> + Send>>> {
            unimplemented!("not exercised by these tests")
        }
    }

    fn ok_result() -> ProviderChatResult {
        ProviderChatResult {
            message: Message::assistant("hi"),
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
        }
    }

    fn build_router(
        models: Vec<ModelDefinition>,
        providers: ProviderMap,
        config: RoutingConfig,
    ) -> Router {
        let registry = Arc::new(ModelRegistry::from_models(models));
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let breaker = Arc::new(CircuitBreaker::new(store.clone(), CircuitBreakerConfig::default()));
        let limiter = Arc::new(RateLimiter::new(
            store.clone(),
            RateLimiterConfig { model_requests_per_minute: None },
        ));
        let selector =
            Arc::new(Selector::new(registry.clone(), breaker.clone(), store.clone(), 600_000));
        Router::new(registry, store, breaker, limiter, selector, Arc::new(providers), config)
    }

    fn req(messages: Vec<Message>) -> ChatCompletionRequest {
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

    #[tokio::test]
    async fn happy_path_returns_on_first_success() {
        let mut providers = ProviderMap::new();
        providers.insert(
            "openrouter",
            Arc::new(ScriptedProvider {
                name: "openrouter".into(),
                results: vec![Ok(ok_result())],
                calls: AtomicU32::new(0),
            }),
        );
        let router = build_router(
            vec![model("m1", "openrouter")],
            providers,
            RoutingConfig { retry_delay_ms: 1, ..RoutingConfig::default() },
        );

        let cancel = CancellationToken::new();
        let response = router.route(&req(vec![Message::user("hi")]), &cancel).await.unwrap();
        assert_eq!(response.router.model_name, "m1");
        assert_eq!(response.router.attempts, 1);
        assert!(!response.router.fallback_used);
    }

    #[tokio::test]
    async fn transient_failure_then_switch_to_second_model() {
        let mut providers = ProviderMap::new();
        providers.insert(
            "openrouter",
            Arc::new(ScriptedProvider {
                name: "openrouter".into(),
                results: vec![Err(RouterError::Api { status: 500, message: "boom".into() })],
                calls: AtomicU32::new(0),
            }),
        );
        providers.insert(
            "deepseek",
            Arc::new(ScriptedProvider {
                name: "deepseek".into(),
                results: vec![Ok(ok_result())],
                calls: AtomicU32::new(0),
            }),
        );
        let mut m1 = model("m1", "openrouter");
        m1.priority = 1;
        let mut m2 = model("m2", "deepseek");
        m2.priority = 2;
        let router = build_router(
            vec![m1, m2],
            providers,
            RoutingConfig {
                max_same_model_retries: 0,
                retry_delay_ms: 1,
                ..RoutingConfig::default()
            },
        );

        let mut request = req(vec![Message::user("hi")]);
        request.model = Some(crate::types::ModelSelector::Priority(vec![
            "m1".to_string(),
            "m2".to_string(),
        ]));
        let cancel = CancellationToken::new();
        let response = router.route(&request, &cancel).await.unwrap();
        assert_eq!(response.router.model_name, "m2");
        assert_eq!(response.router.attempts, 2);
    }

    #[tokio::test]
    async fn all_models_failing_surfaces_all_models_failed() {
        let mut providers = ProviderMap::new();
        providers.insert(
            "openrouter",
            Arc::new(ScriptedProvider {
                name: "openrouter".into(),
                results: vec![Err(RouterError::Api { status: 500, message: "boom".into() })],
                calls: AtomicU32::new(0),
            }),
        );
        let router = build_router(
            vec![model("m1", "openrouter")],
            providers,
            RoutingConfig {
                max_model_switches: 0,
                max_same_model_retries: 0,
                retry_delay_ms: 1,
                ..RoutingConfig::default()
            },
        );

        let cancel = CancellationToken::new();
        let err = router.route(&req(vec![Message::user("hi")]), &cancel).await.unwrap_err();
        assert!(matches!(err, RouterError::AllModelsFailed { .. }));
    }

    #[tokio::test]
    async fn already_cancelled_token_is_rejected_up_front() {
        let router = build_router(vec![], ProviderMap::new(), RoutingConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = router.route(&req(vec![Message::user("hi")]), &cancel).await.unwrap_err();
        assert!(matches!(err, RouterError::RequestCancelled(_)));
    }

    #[tokio::test]
    async fn fallback_used_after_all_priority_models_fail() {
        let mut providers = ProviderMap::new();
        providers.insert(
            "openrouter",
            Arc::new(ScriptedProvider {
                name: "openrouter".into(),
                results: vec![Err(RouterError::Api { status: 500, message: "boom".into() })],
                calls: AtomicU32::new(0),
            }),
        );
        providers.insert(
            "deepseek",
            Arc::new(ScriptedProvider {
                name: "deepseek".into(),
                results: vec![Ok(ok_result())],
                calls: AtomicU32::new(0),
            }),
        );
        let mut request = req(vec![Message::user("hi")]);
        request.model = Some(crate::types::ModelSelector::Single("m1".to_string()));
        let router = build_router(
            vec![model("m1", "openrouter"), model("fallback", "deepseek")],
            providers,
            RoutingConfig {
                max_model_switches: 0,
                max_same_model_retries: 0,
                retry_delay_ms: 1,
                fallback_enabled: true,
                fallback_provider: Some("deepseek".to_string()),
                fallback_model: Some("fallback".to_string()),
                ..RoutingConfig::default()
            },
        );

        let cancel = CancellationToken::new();
        let response = router.route(&request, &cancel).await.unwrap();
        assert!(response.router.fallback_used);
        assert_eq!(response.router.model_name, "fallback");
    }

    #[tokio::test]
    async fn rate_limited_model_is_skipped_in_favor_of_next_candidate() {
        let mut providers = ProviderMap::new();
        providers.insert(
            "openrouter",
            Arc::new(ScriptedProvider {
                name: "openrouter".into(),
                results: vec![Ok(ok_result())],
                calls: AtomicU32::new(0),
            }),
        );
        let mut m1 = model("m1", "openrouter");
        m1.priority = 1;
        let mut m2 = model("m2", "openrouter");
        m2.priority = 2;

        let registry = Arc::new(ModelRegistry::from_models(vec![m1, m2]));
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let breaker = Arc::new(CircuitBreaker::new(store.clone(), CircuitBreakerConfig::default()));
        // Exhaust m1's budget before the request so the router must pass over it.
        let limiter = Arc::new(RateLimiter::new(
            store.clone(),
            RateLimiterConfig { model_requests_per_minute: Some(0) },
        ));
        let selector =
            Arc::new(Selector::new(registry.clone(), breaker.clone(), store.clone(), 600_000));
        let router = Router::new(
            registry,
            store,
            breaker,
            limiter,
            selector,
            Arc::new(providers),
            RoutingConfig { retry_delay_ms: 1, ..RoutingConfig::default() },
        );

        let cancel = CancellationToken::new();
        let err = router.route(&req(vec![Message::user("hi")]), &cancel).await.unwrap_err();
        match err {
            RouterError::AllModelsFailed { errors, .. } => {
                assert!(errors.iter().all(|e| e.code == Some(429)));
                assert_eq!(errors.len(), 2);
            }
            other => panic!("expected AllModelsFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn permanently_unavailable_model_is_not_retried_on_a_later_request() {
        let mut providers = ProviderMap::new();
        providers.insert(
            "openrouter",
            Arc::new(ScriptedProvider {
                name: "openrouter".into(),
                results: vec![Err(RouterError::Api { status: 404, message: "gone".into() })],
                calls: AtomicU32::new(0),
            }),
        );
        let router = build_router(
            vec![model("m1", "openrouter")],
            providers,
            RoutingConfig {
                max_model_switches: 0,
                max_same_model_retries: 0,
                retry_delay_ms: 1,
                ..RoutingConfig::default()
            },
        );

        let cancel = CancellationToken::new();
        let first = router.route(&req(vec![Message::user("hi")]), &cancel).await.unwrap_err();
        assert!(matches!(first, RouterError::AllModelsFailed { .. }));
        assert!(
            !router.breaker.can_request("m1").await.unwrap(),
            "404 must trip the breaker permanently"
        );

        let mut second_req = req(vec![Message::user("hi again")]);
        second_req.model = Some(crate::types::ModelSelector::Single("m1".to_string()));
        let second = router.route(&second_req, &cancel).await.unwrap_err();
        assert!(matches!(second, RouterError::AllModelsFailed { .. }));
    }

    #[tokio::test]
    async fn cancellation_during_retry_sleep_aborts_without_a_further_provider_call() {
        let mut providers = ProviderMap::new();
        providers.insert(
            "openrouter",
            Arc::new(ScriptedProvider {
                name: "openrouter".into(),
                results: vec![Err(RouterError::Api { status: 500, message: "boom".into() })],
                calls: AtomicU32::new(0),
            }),
        );
        let router = build_router(
            vec![model("m1", "openrouter")],
            providers,
            RoutingConfig {
                max_same_model_retries: 5,
                retry_delay_ms: 10_000,
                ..RoutingConfig::default()
            },
        );

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            cancel_clone.cancel();
        });

        let err = router.route(&req(vec![Message::user("hi")]), &cancel).await.unwrap_err();
        assert!(matches!(err, RouterError::RequestCancelled(_)));
    }
}
