//! routeward - Smart request routing for OpenAI-compatible LLM gateways
//!
//! This crate is the routing core of an LLM gateway: a model registry with
//! per-request overrides, weighted selection across candidate models,
//! per-model circuit breakers and rate limits, and a retry/fallback control
//! loop. It defines the contracts (`ChatProvider`, `StateStore`) that a
//! transport layer and upstream provider adapters implement; it does not
//! speak HTTP to any upstream itself.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use routeward::{RouterBuilder, ChatCompletionRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! # struct MyProvider;
//! # #[async_trait::async_trait]
//! # impl routeward::ChatProvider for MyProvider {
//! #     fn name(&self) -> &str { "openrouter" }
//! #     async fn chat(&self, _model_id: &str, _params: &routeward::ProviderCallParams) -> routeward::Result<routeward::ProviderChatResult> { unimplemented!() }
//! #     async fn chat_stream(&self, _model_id: &str, _params: &routeward::ProviderCallParams) -> routeward::Result<std::pin::Pin<Box<dyn futures_util::Stream<Item = routeward::Result<routeward::ChatEvent>> + Send>>> { unimplemented!() }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> routeward::Result<()> {
//!     let router = RouterBuilder::new()
//!         .provider("openrouter", Arc::new(MyProvider))
//!         .build()
//!         .await?;
//!
//!     let req: ChatCompletionRequest = serde_json::from_str(
//!         r#"{"model":"openrouter/gpt-4o-mini","messages":[{"role":"user","content":"hi"}]}"#,
//!     ).unwrap();
//!
//!     let cancel = CancellationToken::new();
//!     let response = router.route(&req, &cancel).await?;
//!     println!("{:?}", response.choices[0].message.content);
//!     Ok(())
//! }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod gateway;
pub mod provider;
pub mod rate_limit;
pub mod registry;
pub mod request_builder;
pub mod retry;
pub mod router;
pub mod selector;
pub mod state;
pub mod telemetry;
pub mod types;

pub use config::Config;
pub use error::{CancelReason, Result, RouterError};
pub use gateway::{EmbeddedRouter, RouterBuilder};
pub use provider::{ChatEvent, ChatProvider, ProviderCallParams, ProviderChatResult};
pub use router::{ProviderMap, ProviderResolver, Router};

pub use types::{
    AttemptError, ChatCompletionChoice, ChatCompletionChunk, ChatCompletionRequest,
    ChatCompletionResponse, ChunkChoice, ChunkDelta, ContentPart, FinishReason, FunctionDefinition,
    ImageUrl, Message, MessageContent, ModelDefinition, ModelKind, ModelListEntry, ModelSelector,
    ModelSpeed, Role, RouterMetadata, ToolCall, ToolCallFunction, ToolChoice, ToolDefinition, Usage,
    validate_request,
};
