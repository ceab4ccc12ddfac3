//! Observability around model calls
//!
//! - `TracingLayer` wraps a model service in an `info_span` and logs token
//!   usage and requested tool calls per completion
//! - `Usage` is summed per agent turn and per run
//!
//! Composition
//! - `ServiceBuilder::new().layer(TracingLayer::new()).service(provider)`

use std::future::Future;
use std::pin::Pin;

use tower::{BoxError, Layer, Service};
use tracing::{info, info_span, Instrument};

use crate::provider::{ModelReply, ModelRequest};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

impl Usage {
    pub fn of(reply: &ModelReply) -> Self {
        Self {
            prompt_tokens: reply.prompt_tokens,
            completion_tokens: reply.completion_tokens,
        }
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// Layer that adds tracing around model calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLayer;

impl TracingLayer {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Clone)]
pub struct Tracing<S> {
    inner: S,
}

impl<S> Layer<S> for TracingLayer {
    type Service = Tracing<S>;
    fn layer(&self, inner: S) -> Self::Service {
        Tracing { inner }
    }
}

impl<S> Service<ModelRequest> for Tracing<S>
where
    S: Service<ModelRequest, Response = ModelReply, Error = BoxError> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = ModelReply;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: ModelRequest) -> Self::Future {
        let span = info_span!(
            "completion",
            messages = req.messages.len(),
            tools = req.tools.len()
        );
        let fut = self.inner.call(req).instrument(span.clone());
        Box::pin(
            async move {
                let out = fut.await?;
                let usage = Usage::of(&out);
                info!(
                    prompt = usage.prompt_tokens,
                    completion = usage.completion_tokens,
                    tool_calls = ?out.tool_calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                    "completion done"
                );
                Ok(out)
            }
            .instrument(span),
        )
    }
}
