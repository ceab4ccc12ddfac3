//! Multi-agent orchestration and handoffs
//!
//! Four topologies share one run contract, `Workflow::run(conversation)`:
//!
//! - **Handoff**: a directed graph of agents. Each outgoing edge is offered to
//!   the current agent as a synthetic `handoff_to_<target>` tool. Calling it
//!   moves control to the target. The run ends when the output agent replies
//!   without a handoff; any other agent that does so hands back to it.
//! - **Group chat**: participants speak in the order chosen by an
//!   `AgentPicker` (round robin by default) until it stops picking.
//! - **Sequential**: a pipeline where each agent sees everything before it.
//! - **Single**: one agent, optionally behind a pre-processing `Executor`.
//!
//! ## HandoffPolicy - "HOW do agents collaborate?"
//! - Defines the handoff tools an agent sees and turns a handoff tool call into
//!   a `HandoffRequest`
//! - `HandoffLayer` wraps an agent's tool router so handoff calls are
//!   intercepted before they reach real tools
//!
//! Workflows are immutable after `build()` and `Send + Sync`; every run owns
//! its own history and current-agent pointer.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower::{BoxError, Layer, Service};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::core::{ToolInvocation, ToolOutput};
use crate::error::{Result, WorkflowError};
use crate::items::Message;
use crate::observability::Usage;
use crate::provider::ToolSpec;

pub mod group_chat;
pub mod handoff;
pub mod sequential;
pub mod single;

pub use group_chat::{AgentPicker, GroupChatBuilder, GroupChatWorkflow, PickRequest, RoundRobinPicker};
pub use handoff::{HandoffBuilder, HandoffWorkflow};
pub use sequential::{SequentialBuilder, SequentialWorkflow};
pub use single::SingleAgentWorkflow;

pub type AgentName = String;

// ================================================================================================
// Handoff Types
// ================================================================================================

/// Directed routing option from one agent to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffEdge {
    pub source: AgentName,
    pub target: AgentName,
    /// When to use this edge, shown to the model as the tool description
    pub condition: String,
}

impl HandoffEdge {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            condition: condition.into(),
        }
    }

    pub fn tool_name(&self) -> String {
        handoff_tool_name(&self.target)
    }
}

/// Name of the synthetic tool that hands control to `target`.
///
/// Characters outside `[A-Za-z0-9_-]` are replaced so the name is a valid
/// function name for the chat API.
pub fn handoff_tool_name(target: &str) -> String {
    let sanitized: String = target
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("handoff_to_{}", sanitized)
}

/// Request to handoff conversation to another agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffRequest {
    /// Target agent to handoff to
    pub target_agent: AgentName,
    /// Optional reason given by the model
    pub reason: Option<String>,
    /// Optional context data passed along by the model
    pub context: Option<Value>,
}

/// Defines handoff tools and how calls to them become handoff requests.
pub trait HandoffPolicy: Send + Sync + 'static {
    /// Tools injected next to the agent's own tools.
    fn handoff_tools(&self) -> Vec<ToolSpec>;

    /// Convert a handoff tool call into a `HandoffRequest`.
    fn handle_handoff_tool(&self, invocation: &ToolInvocation) -> std::result::Result<HandoffRequest, BoxError>;

    fn is_handoff_tool(&self, tool_name: &str) -> bool;
}

/// Policy for agents that never hand off (group chat, sequential, single).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHandoffs;

impl HandoffPolicy for NoHandoffs {
    fn handoff_tools(&self) -> Vec<ToolSpec> {
        Vec::new()
    }

    fn handle_handoff_tool(&self, invocation: &ToolInvocation) -> std::result::Result<HandoffRequest, BoxError> {
        Err(format!("Not a handoff tool: {}", invocation.name).into())
    }

    fn is_handoff_tool(&self, _tool_name: &str) -> bool {
        false
    }
}

/// One handoff tool per outgoing edge of a single source agent.
#[derive(Debug, Clone, Default)]
pub struct EdgeHandoffPolicy {
    edges: Vec<HandoffEdge>,
}

impl EdgeHandoffPolicy {
    pub fn new(edges: Vec<HandoffEdge>) -> Self {
        Self { edges }
    }

    pub fn edges(&self) -> &[HandoffEdge] {
        &self.edges
    }

    fn edge_for_tool(&self, tool_name: &str) -> Option<&HandoffEdge> {
        self.edges.iter().find(|e| e.tool_name() == tool_name)
    }
}

impl HandoffPolicy for EdgeHandoffPolicy {
    fn handoff_tools(&self) -> Vec<ToolSpec> {
        self.edges
            .iter()
            .map(|edge| ToolSpec {
                name: edge.tool_name(),
                description: edge.condition.clone(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "reason": {
                            "type": "string",
                            "description": "Reason for the handoff"
                        },
                        "context": {
                            "type": "object",
                            "description": "Optional context to pass to the target agent"
                        }
                    }
                }),
            })
            .collect()
    }

    fn handle_handoff_tool(&self, invocation: &ToolInvocation) -> std::result::Result<HandoffRequest, BoxError> {
        let edge = self
            .edge_for_tool(&invocation.name)
            .ok_or_else(|| format!("Not a handoff tool: {}", invocation.name))?;

        let reason = invocation
            .arguments
            .get("reason")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let context = invocation.arguments.get("context").cloned();

        debug!(source = %edge.source, target = %edge.target, ?reason, "handoff tool called");
        Ok(HandoffRequest {
            target_agent: edge.target.clone(),
            reason,
            context,
        })
    }

    fn is_handoff_tool(&self, tool_name: &str) -> bool {
        self.edge_for_tool(tool_name).is_some()
    }
}

// ================================================================================================
// Handoff Layer - Tower Integration
// ================================================================================================

/// ToolOutput that can signal handoff requests.
#[derive(Debug, Clone)]
pub enum ToolOutputResult {
    /// Regular tool output
    Tool(ToolOutput),
    /// Handoff request from a handoff tool
    Handoff(HandoffRequest),
}

/// Layer that routes handoff tool calls to the policy and everything else to
/// the wrapped tool service.
#[derive(Debug, Clone)]
pub struct HandoffLayer<P> {
    handoff_policy: P,
}

impl<P> HandoffLayer<P>
where
    P: HandoffPolicy,
{
    pub fn new(policy: P) -> Self {
        Self {
            handoff_policy: policy,
        }
    }
}

impl<S, P> Layer<S> for HandoffLayer<P>
where
    P: HandoffPolicy + Clone,
{
    type Service = HandoffService<S, P>;

    fn layer(&self, inner: S) -> Self::Service {
        HandoffService::new(inner, self.handoff_policy.clone())
    }
}

/// Service that wraps a tool service and adds handoff capabilities.
#[derive(Debug, Clone)]
pub struct HandoffService<S, P> {
    inner: S,
    handoff_policy: P,
}

impl<S, P> HandoffService<S, P>
where
    P: HandoffPolicy,
{
    pub fn new(inner: S, policy: P) -> Self {
        Self {
            inner,
            handoff_policy: policy,
        }
    }
}

impl<S, P> Service<ToolInvocation> for HandoffService<S, P>
where
    S: Service<ToolInvocation, Response = ToolOutput, Error = BoxError> + Send + 'static,
    S::Future: Send + 'static,
    P: HandoffPolicy + Clone,
{
    type Response = ToolOutputResult;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: ToolInvocation) -> Self::Future {
        if self.handoff_policy.is_handoff_tool(&req.name) {
            let policy = self.handoff_policy.clone();
            Box::pin(async move {
                let handoff_request = policy.handle_handoff_tool(&req)?;
                Ok(ToolOutputResult::Handoff(handoff_request))
            })
        } else {
            let future = self.inner.call(req);
            Box::pin(async move {
                let output = future.await?;
                Ok(ToolOutputResult::Tool(output))
            })
        }
    }
}

// ================================================================================================
// Runs
// ================================================================================================

/// One agent turn as seen by the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnRecord {
    pub agent: AgentName,
    pub handoff_to: Option<AgentName>,
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub run_id: Uuid,
    /// Messages appended during the run, in order
    pub messages: Vec<Message>,
    /// The workflow's answer
    pub output: Message,
    pub output_agent: AgentName,
    pub turns: Vec<TurnRecord>,
    /// Tokens spent by every model call in the run
    pub usage: Usage,
}

impl RunOutput {
    /// Agents in the order they took turns.
    pub fn speakers(&self) -> Vec<&str> {
        self.turns.iter().map(|t| t.agent.as_str()).collect()
    }
}

/// Built, immutable workflow of any topology.
#[derive(Clone)]
pub enum Workflow {
    Handoff(Arc<HandoffWorkflow>),
    GroupChat(Arc<GroupChatWorkflow>),
    Sequential(Arc<SequentialWorkflow>),
    Single(Arc<SingleAgentWorkflow>),
}

impl Workflow {
    pub fn kind(&self) -> &'static str {
        match self {
            Workflow::Handoff(_) => "handoff",
            Workflow::GroupChat(_) => "group_chat",
            Workflow::Sequential(_) => "sequential",
            Workflow::Single(_) => "single",
        }
    }

    /// Execute one run over `conversation`.
    #[instrument(skip_all, fields(kind = self.kind(), input = conversation.len()))]
    pub async fn run(&self, conversation: Vec<Message>) -> Result<RunOutput> {
        match self {
            Workflow::Handoff(w) => w.run(conversation).await,
            Workflow::GroupChat(w) => w.run(conversation).await,
            Workflow::Sequential(w) => w.run(conversation).await,
            Workflow::Single(w) => w.run(conversation).await,
        }
    }
}

impl From<HandoffWorkflow> for Workflow {
    fn from(w: HandoffWorkflow) -> Self {
        Workflow::Handoff(Arc::new(w))
    }
}

impl From<GroupChatWorkflow> for Workflow {
    fn from(w: GroupChatWorkflow) -> Self {
        Workflow::GroupChat(Arc::new(w))
    }
}

impl From<SequentialWorkflow> for Workflow {
    fn from(w: SequentialWorkflow) -> Self {
        Workflow::Sequential(Arc::new(w))
    }
}

impl From<SingleAgentWorkflow> for Workflow {
    fn from(w: SingleAgentWorkflow) -> Self {
        Workflow::Single(Arc::new(w))
    }
}

impl Service<Vec<Message>> for Workflow {
    type Response = RunOutput;
    type Error = WorkflowError;
    type Future = Pin<Box<dyn Future<Output = Result<RunOutput>> + Send>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, conversation: Vec<Message>) -> Self::Future {
        let workflow = self.clone();
        Box::pin(async move { workflow.run(conversation).await })
    }
}

pub(crate) fn require_distinct<'a>(
    names: impl IntoIterator<Item = &'a str>,
) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(WorkflowError::topology(format!(
                "agent {} is registered more than once",
                name
            )));
        }
    }
    Ok(())
}
