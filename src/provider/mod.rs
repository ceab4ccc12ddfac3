//! Chat-completion capability
//!
//! The engine only needs `complete(messages, tools) -> reply`. That contract is
//! expressed as a Tower service so any backend (OpenAI, a scripted mock, a
//! layered stack) plugs in the same way:
//!
//! - `ModelService: Service<ModelRequest, Response = ModelReply, Error = BoxError>`
//! - `OpenAIProvider` talks to the OpenAI chat completions API
//! - `FixedProvider` and `ScriptedProvider` return canned replies for tests

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tower::{util::BoxCloneService, BoxError, Service, ServiceExt};
use tracing::debug;

use crate::codec;
use crate::core::SharedService;
use crate::items::{Message, ToolCall};

/// Tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One chat-completion call.
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
}

impl ModelRequest {
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }
}

/// The model's answer: text, tool-call requests, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Default::default()
        }
    }
}

pub trait ModelService: Service<ModelRequest, Response = ModelReply, Error = BoxError> {}
impl<T> ModelService for T where T: Service<ModelRequest, Response = ModelReply, Error = BoxError> {}

/// Boxed model service type alias.
pub type ModelSvc = BoxCloneService<ModelRequest, ModelReply, BoxError>;

/// One model capability shared by every agent built from it.
pub type SharedModel = SharedService<ModelSvc>;

/// Box and share any clonable model service.
pub fn shared<P>(provider: P) -> SharedModel
where
    P: Service<ModelRequest, Response = ModelReply, Error = BoxError> + Clone + Send + 'static,
    P::Future: Send + 'static,
{
    SharedService::new(BoxCloneService::new(provider))
}

impl SharedModel {
    pub async fn complete(&self, req: ModelRequest) -> Result<ModelReply, BoxError> {
        let mut svc = self.handle().await;
        svc.ready().await?.call(req).await
    }
}

// =============================
// OpenAI
// =============================

/// Provider backed by the OpenAI chat completions endpoint.
#[derive(Clone)]
pub struct OpenAIProvider {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
    temperature: Option<f32>,
}

impl OpenAIProvider {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: None,
        }
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }
}

impl Service<ModelRequest> for OpenAIProvider {
    type Response = ModelReply;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ModelRequest) -> Self::Future {
        let client = self.client.clone();
        let model = self.model.clone();
        let temperature = self.temperature;
        Box::pin(async move {
            let request = codec::to_openai_request(&model, temperature, &req)?;
            let response = client.chat().create(request).await?;
            let (prompt_tokens, completion_tokens) = response
                .usage
                .as_ref()
                .map(|u| (u.prompt_tokens as usize, u.completion_tokens as usize))
                .unwrap_or_default();
            let choice = response
                .choices
                .into_iter()
                .next()
                .ok_or("model returned no choices")?;
            let mut reply = codec::from_openai_message(choice.message);
            reply.prompt_tokens = prompt_tokens;
            reply.completion_tokens = completion_tokens;
            debug!(
                model = %model,
                prompt_tokens,
                completion_tokens,
                tool_calls = reply.tool_calls.len(),
                "chat completion"
            );
            Ok(reply)
        })
    }
}

// =============================
// Canned providers
// =============================

/// A provider that always returns the same reply.
#[derive(Clone)]
pub struct FixedProvider {
    reply: ModelReply,
}

impl FixedProvider {
    pub fn new(reply: ModelReply) -> Self {
        Self { reply }
    }
}

impl Service<ModelRequest> for FixedProvider {
    type Response = ModelReply;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: ModelRequest) -> Self::Future {
        let reply = self.reply.clone();
        Box::pin(async move { Ok(reply) })
    }
}

/// A provider that pops replies from a script, in order, and records every
/// request it receives. Clones share the script.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    script: Arc<Mutex<VecDeque<Result<ModelReply, String>>>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<ModelReply>) -> Self {
        Self {
            script: Arc::new(Mutex::new(replies.into_iter().map(Ok).collect())),
            requests: Arc::default(),
        }
    }

    /// Queue a failure; the matching call returns it as a model error.
    pub async fn push_error(&self, message: impl Into<String>) {
        self.script.lock().await.push_back(Err(message.into()));
    }

    /// Requests seen so far, oldest first.
    pub async fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn remaining(&self) -> usize {
        self.script.lock().await.len()
    }
}

impl Service<ModelRequest> for ScriptedProvider {
    type Response = ModelReply;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ModelRequest) -> Self::Future {
        let script = self.script.clone();
        let requests = self.requests.clone();
        Box::pin(async move {
            requests.lock().await.push(req);
            match script.lock().await.pop_front() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(message)) => Err(message.into()),
                None => Err("script exhausted".into()),
            }
        })
    }
}
