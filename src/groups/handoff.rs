//! Handoff topology: a directed graph of agents routed by the model itself.

use std::collections::HashMap;

use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::{
    handoff_tool_name, require_distinct, AgentName, EdgeHandoffPolicy, HandoffEdge, RunOutput,
    TurnRecord,
};
use crate::agent::Agent;
use crate::error::{Result, WorkflowError};
use crate::items::Message;
use crate::observability::Usage;

pub const DEFAULT_MAX_HANDOFFS: usize = 10;

/// Assembles a handoff graph starting at one agent.
///
/// ```ignore
/// let kitchen = HandoffBuilder::new(chef.clone())
///     .with_handoff(&chef, &microwave, "If somethings needs to be done with the microwave, ask the microwave.")
///     .with_handoff(&microwave, &chef, "When you are done you should ALWAYS hand back control to the chef.")
///     .build()?;
/// ```
pub struct HandoffBuilder {
    start: AgentName,
    agents: Vec<Agent>,
    edges: Vec<HandoffEdge>,
    output_agent: Option<AgentName>,
    max_handoffs: usize,
}

impl HandoffBuilder {
    pub fn new(start: Agent) -> Self {
        Self {
            start: start.name().to_string(),
            agents: vec![start],
            edges: Vec::new(),
            output_agent: None,
            max_handoffs: DEFAULT_MAX_HANDOFFS,
        }
    }

    /// Register an agent without adding edges.
    pub fn participant(mut self, agent: &Agent) -> Self {
        self.add_agent(agent);
        self
    }

    /// Add a `source -> target` edge; both agents become participants.
    pub fn with_handoff(mut self, source: &Agent, target: &Agent, condition: impl Into<String>) -> Self {
        self.add_agent(source);
        self.add_agent(target);
        self.edges
            .push(HandoffEdge::new(source.name(), target.name(), condition));
        self
    }

    /// Add an edge by name. Endpoints are checked in `build`.
    pub fn edge(mut self, edge: HandoffEdge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Agent whose final answer ends the run. Defaults to the start agent.
    pub fn output_from(mut self, agent: impl Into<String>) -> Self {
        self.output_agent = Some(agent.into());
        self
    }

    pub fn max_handoffs(mut self, max: usize) -> Self {
        self.max_handoffs = max;
        self
    }

    fn add_agent(&mut self, agent: &Agent) {
        if !self.agents.iter().any(|a| a.name() == agent.name()) {
            self.agents.push(agent.clone());
        }
    }

    pub fn build(self) -> Result<HandoffWorkflow> {
        require_distinct(self.agents.iter().map(|a| a.name()))?;
        let agents: HashMap<AgentName, Agent> = self
            .agents
            .into_iter()
            .map(|a| (a.name().to_string(), a))
            .collect();

        let mut outgoing: HashMap<AgentName, Vec<HandoffEdge>> = HashMap::new();
        for edge in self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !agents.contains_key(endpoint) {
                    return Err(WorkflowError::topology(format!(
                        "handoff edge {} -> {} names unregistered agent {}",
                        edge.source, edge.target, endpoint
                    )));
                }
            }
            if edge.source == edge.target {
                return Err(WorkflowError::topology(format!(
                    "agent {} cannot hand off to itself",
                    edge.source
                )));
            }
            let from_source = outgoing.entry(edge.source.clone()).or_default();
            let tool_name = edge.tool_name();
            if from_source.iter().any(|e| e.tool_name() == tool_name) {
                return Err(WorkflowError::topology(format!(
                    "duplicate handoff edge {} -> {}",
                    edge.source, edge.target
                )));
            }
            if agents[&edge.source].has_tool(&tool_name) {
                return Err(WorkflowError::topology(format!(
                    "agent {} already has a tool named {}",
                    edge.source, tool_name
                )));
            }
            from_source.push(edge);
        }

        let output_agent = self.output_agent.unwrap_or_else(|| self.start.clone());
        if !agents.contains_key(&output_agent) {
            return Err(WorkflowError::topology(format!(
                "output agent {} is not a participant",
                output_agent
            )));
        }

        let policies = agents
            .keys()
            .map(|name| {
                let edges = outgoing.remove(name).unwrap_or_default();
                (name.clone(), EdgeHandoffPolicy::new(edges))
            })
            .collect();

        Ok(HandoffWorkflow {
            start: self.start,
            output_agent,
            agents,
            policies,
            max_handoffs: self.max_handoffs,
        })
    }
}

/// Immutable handoff graph. Each run keeps its own history and current agent.
pub struct HandoffWorkflow {
    start: AgentName,
    output_agent: AgentName,
    agents: HashMap<AgentName, Agent>,
    policies: HashMap<AgentName, EdgeHandoffPolicy>,
    max_handoffs: usize,
}

impl std::fmt::Debug for HandoffWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoffWorkflow")
            .field("start", &self.start)
            .field("output_agent", &self.output_agent)
            .field("edges", &self.edges().collect::<Vec<_>>())
            .field("max_handoffs", &self.max_handoffs)
            .finish()
    }
}

impl HandoffWorkflow {
    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn output_agent(&self) -> &str {
        &self.output_agent
    }

    pub fn edges(&self) -> impl Iterator<Item = &HandoffEdge> {
        self.policies.values().flat_map(|p| p.edges().iter())
    }

    /// Handoff tool names offered to `agent`.
    pub fn handoff_tools_for(&self, agent: &str) -> Vec<String> {
        self.policies
            .get(agent)
            .map(|p| p.edges().iter().map(|e| handoff_tool_name(&e.target)).collect())
            .unwrap_or_default()
    }

    pub async fn run(&self, conversation: Vec<Message>) -> Result<RunOutput> {
        let run_id = Uuid::new_v4();
        let span = info_span!("handoff_run", %run_id, start = %self.start);
        self.run_inner(run_id, conversation).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, conversation: Vec<Message>) -> Result<RunOutput> {
        let input_len = conversation.len();
        let mut history = conversation;
        let mut current = self.start.clone();
        let mut handoffs = 0usize;
        let mut turns = Vec::new();
        let mut usage = Usage::default();

        info!(max_handoffs = self.max_handoffs, "starting handoff run");

        loop {
            // Unknown agents are rejected in build(), so this only guards the map lookup.
            let (agent, policy) = match (self.agents.get(&current), self.policies.get(&current)) {
                (Some(a), Some(p)) => (a, p),
                _ => {
                    return Err(WorkflowError::topology(format!(
                        "agent {} is not a participant",
                        current
                    )))
                }
            };

            let turn = agent.respond_with(&history, policy).await?;
            debug!(
                agent = %current,
                messages = turn.messages.len(),
                steps = turn.steps,
                "turn finished"
            );
            usage += turn.usage;
            let output = turn.final_message().cloned();
            history.extend(turn.messages);

            let next = match turn.handoff {
                Some(request) => {
                    info!(
                        from = %current,
                        to = %request.target_agent,
                        reason = ?request.reason,
                        "handoff"
                    );
                    Some(request.target_agent)
                }
                None if current != self.output_agent => {
                    // only the output agent may answer the user
                    warn!(
                        agent = %current,
                        output_agent = %self.output_agent,
                        "agent answered without handing back; returning control"
                    );
                    Some(self.output_agent.clone())
                }
                None => None,
            };

            let Some(target) = next else {
                turns.push(TurnRecord {
                    agent: current.clone(),
                    handoff_to: None,
                });
                let output =
                    output.unwrap_or_else(|| Message::assistant("").with_author(current.clone()));
                info!(output_agent = %current, turns = turns.len(), handoffs, "run complete");
                return Ok(RunOutput {
                    run_id,
                    messages: history.split_off(input_len),
                    output,
                    output_agent: current,
                    turns,
                    usage,
                });
            };

            handoffs += 1;
            turns.push(TurnRecord {
                agent: current.clone(),
                handoff_to: Some(target.clone()),
            });
            if handoffs > self.max_handoffs {
                warn!(max_handoffs = self.max_handoffs, "handoff limit exceeded");
                return Err(WorkflowError::MaxHandoffsExceeded {
                    max_handoffs: self.max_handoffs,
                });
            }
            current = target;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::ToolCall;
    use crate::provider::{shared, ModelReply, ScriptedProvider};
    use serde_json::json;

    fn agent(name: &str, provider: &ScriptedProvider) -> Agent {
        Agent::builder(name, shared(provider.clone())).build().unwrap()
    }

    fn handoff(to: &str) -> ModelReply {
        ModelReply::tool_calls(vec![ToolCall::new(
            format!("call_{to}"),
            format!("handoff_to_{to}"),
            json!({}),
        )])
    }

    #[test]
    fn unregistered_edge_target_is_rejected() {
        let provider = ScriptedProvider::default();
        let chef = agent("chef", &provider);
        let err = HandoffBuilder::new(chef)
            .edge(HandoffEdge::new("chef", "dishwasher", "Clean up"))
            .build()
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTopology { .. }));
        assert!(err.to_string().contains("dishwasher"));
    }

    #[test]
    fn output_agent_must_be_registered() {
        let provider = ScriptedProvider::default();
        let err = HandoffBuilder::new(agent("chef", &provider))
            .output_from("waiter")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("waiter"));
    }

    #[test]
    fn only_outgoing_edges_are_offered() {
        let provider = ScriptedProvider::default();
        let chef = agent("chef", &provider);
        let microwave = agent("microwave", &provider);
        let fridge = agent("fridge", &provider);
        let wf = HandoffBuilder::new(chef.clone())
            .with_handoff(&chef, &microwave, "heat")
            .participant(&fridge)
            .build()
            .unwrap();
        assert_eq!(wf.handoff_tools_for("chef"), vec!["handoff_to_microwave"]);
        assert!(wf.handoff_tools_for("microwave").is_empty());
        assert!(wf.handoff_tools_for("fridge").is_empty());
    }

    #[tokio::test]
    async fn handoff_loop_is_bounded() {
        let provider = ScriptedProvider::new(vec![
            handoff("microwave"),
            handoff("chef"),
            handoff("microwave"),
            handoff("chef"),
        ]);
        let chef = agent("chef", &provider);
        let microwave = agent("microwave", &provider);
        let wf = HandoffBuilder::new(chef.clone())
            .with_handoff(&chef, &microwave, "heat")
            .with_handoff(&microwave, &chef, "back")
            .max_handoffs(3)
            .build()
            .unwrap();

        let err = wf.run(vec![Message::user("loop")]).await.unwrap_err();
        assert!(matches!(err, WorkflowError::MaxHandoffsExceeded { max_handoffs: 3 }));
        assert_eq!(err.to_string(), "Too many handoffs: limit of 3 exceeded");
    }

    #[tokio::test]
    async fn reply_without_handoff_from_start_agent_ends_run() {
        let provider = ScriptedProvider::new(vec![ModelReply::text("I only talk about kitchens.")]);
        let chef = agent("chef", &provider);
        let microwave = agent("microwave", &provider);
        let wf = HandoffBuilder::new(chef.clone())
            .with_handoff(&chef, &microwave, "heat")
            .build()
            .unwrap();

        let out = wf.run(vec![Message::user("what is the weather")]).await.unwrap();
        assert_eq!(out.speakers(), vec!["chef"]);
        assert_eq!(out.output.content, "I only talk about kitchens.");
        assert_eq!(out.messages.len(), 1);
    }

    #[tokio::test]
    async fn specialist_answering_the_user_returns_control_to_output_agent() {
        let provider = ScriptedProvider::new(vec![
            handoff("microwave"),
            ModelReply::text("Beep! I am a microwave, talking to the user."),
            ModelReply::text("The microwave is on it."),
        ]);
        let chef = agent("chef", &provider);
        let microwave = agent("microwave", &provider);
        let wf = HandoffBuilder::new(chef.clone())
            .with_handoff(&chef, &microwave, "heat")
            .with_handoff(&microwave, &chef, "back")
            .build()
            .unwrap();

        let out = wf.run(vec![Message::user("heat soup")]).await.unwrap();
        assert_eq!(out.speakers(), vec!["chef", "microwave", "chef"]);
        assert_eq!(out.output_agent, "chef");
        assert_eq!(out.output.author(), Some("chef"));
        assert_eq!(out.output.content, "The microwave is on it.");
        assert_eq!(out.turns[1].handoff_to.as_deref(), Some("chef"));
    }

    #[tokio::test]
    async fn implicit_return_counts_against_the_handoff_limit() {
        let provider = ScriptedProvider::new(vec![
            handoff("microwave"),
            ModelReply::text("Beep!"),
        ]);
        let chef = agent("chef", &provider);
        let microwave = agent("microwave", &provider);
        let wf = HandoffBuilder::new(chef.clone())
            .with_handoff(&chef, &microwave, "heat")
            .max_handoffs(1)
            .build()
            .unwrap();

        let err = wf.run(vec![Message::user("heat soup")]).await.unwrap_err();
        assert!(matches!(err, WorkflowError::MaxHandoffsExceeded { max_handoffs: 1 }));
        assert_eq!(provider.remaining().await, 0);
    }

    #[tokio::test]
    async fn usage_is_summed_across_turns() {
        let mut first = handoff("microwave");
        first.prompt_tokens = 10;
        first.completion_tokens = 2;
        let mut second = handoff("chef");
        second.prompt_tokens = 20;
        second.completion_tokens = 3;
        let mut last = ModelReply::text("done");
        last.prompt_tokens = 30;
        last.completion_tokens = 4;

        let provider = ScriptedProvider::new(vec![first, second, last]);
        let chef = agent("chef", &provider);
        let microwave = agent("microwave", &provider);
        let wf = HandoffBuilder::new(chef.clone())
            .with_handoff(&chef, &microwave, "heat")
            .with_handoff(&microwave, &chef, "back")
            .build()
            .unwrap();

        let out = wf.run(vec![Message::user("heat soup")]).await.unwrap();
        assert_eq!(out.usage.prompt_tokens, 60);
        assert_eq!(out.usage.completion_tokens, 9);
    }
}
