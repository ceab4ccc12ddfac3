//! # Agent
//!
//! An `Agent` is a named, instructed participant: persona text, a fixed tool
//! set, and a shared chat-completion capability. It is stateless between
//! turns; each call to `respond` works over the history it is given and
//! returns only the messages it produced.
//!
//! A turn loops model call -> tool execution -> model call until the model
//! answers without tool calls, the model picks a handoff tool, or the step
//! bound is hit.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tower::{BoxError, Layer, ServiceExt};
use tracing::{debug, instrument, warn};

use crate::core::{render_tool_result, SharedService, ToolDef, ToolInvocation, ToolRouter};
use crate::error::{Result, WorkflowError};
use crate::groups::{HandoffLayer, HandoffPolicy, HandoffRequest, NoHandoffs, ToolOutputResult};
use crate::items::{Message, Role, ToolCall};
use crate::observability::Usage;
use crate::provider::{ModelRequest, SharedModel, ToolSpec};

pub const DEFAULT_MAX_STEPS: usize = 8;

/// Tool result for a handoff call that lost to an earlier one in the same reply.
pub const IGNORED_HANDOFF: &str = "Ignored: only one handoff per turn.";

/// Configured, immutable participant.
#[derive(Clone)]
pub struct Agent {
    name: String,
    description: Option<String>,
    instructions: Option<String>,
    tools: SharedService<ToolRouter>,
    tool_specs: Arc<Vec<ToolSpec>>,
    model: SharedModel,
    max_steps: usize,
    parallel_tools: bool,
    tool_concurrency_limit: Option<usize>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("tools", &self.tool_names())
            .field("max_steps", &self.max_steps)
            .finish()
    }
}

/// What one agent turn produced.
#[derive(Debug, Clone)]
pub struct AgentTurn {
    pub agent: String,
    /// New messages only: assistant replies and tool results
    pub messages: Vec<Message>,
    /// Set when the model selected a handoff tool
    pub handoff: Option<HandoffRequest>,
    /// Model calls made
    pub steps: usize,
    pub usage: Usage,
}

impl AgentTurn {
    /// Last assistant message of the turn.
    pub fn final_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }
}

impl Agent {
    pub fn builder(name: impl Into<String>, model: SharedModel) -> AgentBuilder {
        AgentBuilder {
            name: name.into(),
            description: None,
            instructions: None,
            tools: Vec::new(),
            model,
            max_steps: DEFAULT_MAX_STEPS,
            parallel_tools: false,
            tool_concurrency_limit: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tool_specs.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tool_specs.iter().any(|t| t.name == name)
    }

    /// Run one turn with no handoff tools.
    pub async fn respond(&self, history: &[Message]) -> Result<AgentTurn> {
        self.respond_with(history, &NoHandoffs).await
    }

    /// Run one turn, offering the policy's handoff tools next to the agent's own.
    #[instrument(skip_all, fields(agent = %self.name))]
    pub async fn respond_with<P>(&self, history: &[Message], policy: &P) -> Result<AgentTurn>
    where
        P: HandoffPolicy + Clone,
    {
        let mut transcript = Vec::with_capacity(history.len() + 1);
        if let Some(instructions) = &self.instructions {
            transcript.push(Message::system(instructions.clone()));
        }
        transcript.extend_from_slice(history);

        let mut tools: Vec<ToolSpec> = self.tool_specs.as_ref().clone();
        tools.extend(policy.handoff_tools());

        let mut produced = Vec::new();
        let mut usage = Usage::default();

        for step in 1..=self.max_steps {
            debug!(step, messages = transcript.len(), tools = tools.len(), "calling model");
            let reply = self
                .model
                .complete(ModelRequest {
                    messages: transcript.clone(),
                    tools: tools.clone(),
                })
                .await
                .map_err(WorkflowError::Model)?;
            usage += Usage::of(&reply);

            let calls = reply.tool_calls;
            let assistant = Message::assistant_with_tool_calls(
                reply.content.unwrap_or_default(),
                calls.clone(),
            )
            .with_author(self.name.clone());
            transcript.push(assistant.clone());
            produced.push(assistant);

            if calls.is_empty() {
                return Ok(AgentTurn {
                    agent: self.name.clone(),
                    messages: produced,
                    handoff: None,
                    steps: step,
                    usage,
                });
            }

            let (results, handoff) = self.run_tools(&calls, policy).await;
            transcript.extend(results.iter().cloned());
            produced.extend(results);

            if handoff.is_some() {
                return Ok(AgentTurn {
                    agent: self.name.clone(),
                    messages: produced,
                    handoff,
                    steps: step,
                    usage,
                });
            }
        }

        Err(WorkflowError::MaxStepsExceeded {
            agent: self.name.clone(),
            max_steps: self.max_steps,
        })
    }

    /// Execute the calls of one reply. Results come back in call order whether
    /// or not the calls ran concurrently.
    async fn run_tools<P>(
        &self,
        calls: &[ToolCall],
        policy: &P,
    ) -> (Vec<Message>, Option<HandoffRequest>)
    where
        P: HandoffPolicy + Clone,
    {
        let router = self.tools.handle().await;
        let svc = HandoffLayer::new(policy.clone()).layer(router);

        let invocations = calls.iter().map(|c| ToolInvocation {
            id: c.id.clone(),
            name: c.name.clone(),
            arguments: c.arguments.clone(),
        });

        let results: Vec<std::result::Result<ToolOutputResult, BoxError>> =
            if self.parallel_tools && calls.len() > 1 {
                let sem = self.tool_concurrency_limit.map(|n| Arc::new(Semaphore::new(n)));
                let futures = invocations.map(|inv| {
                    let svc = svc.clone();
                    let sem = sem.clone();
                    async move {
                        let _permit = match &sem {
                            Some(s) => s.clone().acquire_owned().await.ok(),
                            None => None,
                        };
                        svc.oneshot(inv).await
                    }
                });
                join_all(futures).await
            } else {
                let mut out = Vec::with_capacity(calls.len());
                for inv in invocations {
                    out.push(svc.clone().oneshot(inv).await);
                }
                out
            };

        let mut handoff: Option<HandoffRequest> = None;
        let mut messages = Vec::with_capacity(calls.len());
        for (call, result) in calls.iter().zip(results) {
            let content = match result {
                Ok(ToolOutputResult::Tool(out)) => {
                    debug!(tool = %call.name, id = %call.id, "tool completed");
                    render_tool_result(&out.result)
                }
                Ok(ToolOutputResult::Handoff(req)) if handoff.is_none() => {
                    let text = format!("Transferred to {}.", req.target_agent);
                    handoff = Some(req);
                    text
                }
                Ok(ToolOutputResult::Handoff(req)) => {
                    warn!(agent = %self.name, target = %req.target_agent, "extra handoff ignored");
                    IGNORED_HANDOFF.to_string()
                }
                Err(e) => {
                    warn!(agent = %self.name, tool = %call.name, error = %e, "tool failed");
                    format!("Tool error: {}", e)
                }
            };
            messages.push(Message::tool(content, call.id.clone()));
        }
        (messages, handoff)
    }
}

pub struct AgentBuilder {
    name: String,
    description: Option<String>,
    instructions: Option<String>,
    tools: Vec<ToolDef>,
    model: SharedModel,
    max_steps: usize,
    parallel_tools: bool,
    tool_concurrency_limit: Option<usize>,
}

impl AgentBuilder {
    /// Used by routing models to decide when to hand off to this agent.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn tool(mut self, tool: ToolDef) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDef>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Run independent tool calls of one reply concurrently.
    pub fn parallel_tools(mut self, enabled: bool) -> Self {
        self.parallel_tools = enabled;
        self
    }

    pub fn tool_concurrency_limit(mut self, limit: usize) -> Self {
        self.tool_concurrency_limit = Some(limit.max(1));
        self
    }

    pub fn build(self) -> Result<Agent> {
        let mut seen = std::collections::HashSet::new();
        for tool in &self.tools {
            if !seen.insert(tool.name.as_str()) {
                return Err(WorkflowError::DuplicateTool {
                    agent: self.name.clone(),
                    tool: tool.name.clone(),
                });
            }
        }

        let (router, specs) = ToolRouter::new(self.tools);
        Ok(Agent {
            name: self.name,
            description: self.description,
            instructions: self.instructions,
            tools: SharedService::new(router),
            tool_specs: Arc::new(specs),
            model: self.model,
            max_steps: self.max_steps,
            parallel_tools: self.parallel_tools,
            tool_concurrency_limit: self.tool_concurrency_limit,
        })
    }
}
