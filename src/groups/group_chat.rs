//! Group chat: participants take turns in an order chosen by a picker.
//!
//! The picker is a Tower service, so round robin and content-based routing
//! plug in the same way. No handoff tools are offered.

use std::future::Future;
use std::pin::Pin;

use tower::{util::BoxCloneService, BoxError, Service, ServiceExt};
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use super::{require_distinct, AgentName, RunOutput, TurnRecord};
use crate::agent::Agent;
use crate::core::SharedService;
use crate::error::{Result, WorkflowError};
use crate::items::Message;
use crate::observability::Usage;

/// Input to a picker before each turn.
#[derive(Debug, Clone)]
pub struct PickRequest {
    /// History so far, including earlier turns of this run
    pub messages: Vec<Message>,
    /// Turns already taken in this run
    pub iteration: usize,
    pub participants: Vec<AgentName>,
}

/// Chooses the next speaker; `None` ends the chat.
pub trait AgentPicker: Service<PickRequest, Response = Option<AgentName>, Error = BoxError> {}
impl<T> AgentPicker for T where T: Service<PickRequest, Response = Option<AgentName>, Error = BoxError> {}

pub type PickerSvc = BoxCloneService<PickRequest, Option<AgentName>, BoxError>;

/// Cycles through participants in registration order for `max_iterations` turns.
#[derive(Debug, Clone, Copy)]
pub struct RoundRobinPicker {
    max_iterations: usize,
}

impl RoundRobinPicker {
    pub fn new(max_iterations: usize) -> Self {
        Self { max_iterations }
    }
}

impl Service<PickRequest> for RoundRobinPicker {
    type Response = Option<AgentName>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: PickRequest) -> Self::Future {
        let next = if req.iteration >= self.max_iterations || req.participants.is_empty() {
            None
        } else {
            Some(req.participants[req.iteration % req.participants.len()].clone())
        };
        Box::pin(async move { Ok(next) })
    }
}

pub struct GroupChatBuilder {
    participants: Vec<Agent>,
    picker: Option<PickerSvc>,
    max_iterations: usize,
}

impl GroupChatBuilder {
    /// Round-robin chat that stops after `max_iterations` turns.
    pub fn round_robin(max_iterations: usize) -> Self {
        Self {
            participants: Vec::new(),
            picker: None,
            max_iterations,
        }
    }

    pub fn participant(mut self, agent: &Agent) -> Self {
        self.participants.push(agent.clone());
        self
    }

    pub fn participants<'a>(mut self, agents: impl IntoIterator<Item = &'a Agent>) -> Self {
        self.participants.extend(agents.into_iter().cloned());
        self
    }

    /// Replace round robin with a custom picker.
    pub fn picker<P>(mut self, picker: P) -> Self
    where
        P: AgentPicker + Clone + Send + 'static,
        P::Future: Send + 'static,
    {
        self.picker = Some(BoxCloneService::new(picker));
        self
    }

    pub fn build(self) -> Result<GroupChatWorkflow> {
        if self.participants.is_empty() {
            return Err(WorkflowError::topology("group chat needs at least one participant"));
        }
        if self.picker.is_none() && self.max_iterations == 0 {
            return Err(WorkflowError::topology("group chat needs at least one iteration"));
        }
        require_distinct(self.participants.iter().map(|a| a.name()))?;

        let picker = self
            .picker
            .unwrap_or_else(|| BoxCloneService::new(RoundRobinPicker::new(self.max_iterations)));
        Ok(GroupChatWorkflow {
            participants: self.participants,
            picker: SharedService::new(picker),
        })
    }
}

pub struct GroupChatWorkflow {
    participants: Vec<Agent>,
    picker: SharedService<PickerSvc>,
}

impl GroupChatWorkflow {
    pub fn participant_names(&self) -> Vec<AgentName> {
        self.participants.iter().map(|a| a.name().to_string()).collect()
    }

    pub async fn run(&self, conversation: Vec<Message>) -> Result<RunOutput> {
        let run_id = Uuid::new_v4();
        let span = info_span!("group_chat_run", %run_id, participants = self.participants.len());
        self.run_inner(run_id, conversation).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, conversation: Vec<Message>) -> Result<RunOutput> {
        let input_len = conversation.len();
        let mut history = conversation;
        let mut turns: Vec<TurnRecord> = Vec::new();
        let mut output: Option<(AgentName, Message)> = None;
        let mut usage = Usage::default();
        let names = self.participant_names();

        loop {
            let mut picker = self.picker.handle().await;
            let next = picker
                .ready()
                .await
                .map_err(WorkflowError::Routing)?
                .call(PickRequest {
                    messages: history.clone(),
                    iteration: turns.len(),
                    participants: names.clone(),
                })
                .await
                .map_err(WorkflowError::Routing)?;

            let Some(name) = next else { break };
            let agent = self
                .participants
                .iter()
                .find(|a| a.name() == name)
                .ok_or_else(|| {
                    WorkflowError::topology(format!("picker chose unknown participant {}", name))
                })?;

            let turn = agent.respond(&history).await?;
            debug!(agent = %name, steps = turn.steps, "group chat turn");
            usage += turn.usage;
            if let Some(msg) = turn.final_message() {
                output = Some((name.clone(), msg.clone()));
            }
            history.extend(turn.messages);
            turns.push(TurnRecord {
                agent: name,
                handoff_to: None,
            });
        }

        let (output_agent, output) = output.ok_or_else(|| {
            WorkflowError::Routing("group chat ended before any participant spoke".into())
        })?;
        info!(turns = turns.len(), output_agent = %output_agent, "group chat complete");
        Ok(RunOutput {
            run_id,
            messages: history.split_off(input_len),
            output,
            output_agent,
            turns,
            usage,
        })
    }
}
