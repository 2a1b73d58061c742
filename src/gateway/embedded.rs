//! `EmbeddedRouter` — wraps a [`Router`] with the state store's lifecycle
//! (`init`/`close`), delegating request handling straight through to it.

use std::pin::Pin;
use std::sync::Arc;

use futures_util::Stream;
use tokio_util::sync::CancellationToken;

use crate::provider::ChatEvent;
use crate::router::Router;
use crate::state::StateStore;
use crate::types::{ChatCompletionRequest, ChatCompletionResponse, ModelDefinition, RouterMetadata};
use crate::Result;

/// A fully-wired router ready to serve requests, built by [`super::RouterBuilder`].
pub struct EmbeddedRouter {
    router: Router,
    store: Arc<dyn StateStore>,
}

impl EmbeddedRouter {
    pub(crate) fn new(router: Router, store: Arc<dyn StateStore>) -> Self {
        Self { router, store }
    }

    /// Non-streaming chat completion.
    pub async fn route(
        &self,
        req: &ChatCompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionResponse> {
        self.router.route(req, cancel).await
    }

    /// Streaming chat completion.
    pub async fn route_stream(
        &self,
        req: &ChatCompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<(Arc<ModelDefinition>, RouterMetadata, Pin<Box<dyn Stream<Item = Result<ChatEvent>> + Send>>)>
    {
        self.router.route_stream(req, cancel).await
    }

    /// Flush/close the underlying state store. Call during graceful shutdown
    /// once in-flight requests have been cancelled or completed.
    pub async fn shutdown(&self) -> Result<()> {
        self.store.close().await
    }
}
