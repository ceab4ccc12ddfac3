//! Single-agent workflow, optionally preceded by a pre-processing executor.

use std::sync::Arc;

use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use super::{RunOutput, TurnRecord};
use crate::agent::Agent;
use crate::error::Result;
use crate::items::Message;
use crate::retrieval::Executor;

pub struct SingleAgentWorkflow {
    agent: Agent,
    executor: Option<Arc<dyn Executor>>,
}

impl SingleAgentWorkflow {
    pub fn new(agent: Agent) -> Self {
        Self {
            agent,
            executor: None,
        }
    }

    /// Run `executor` over the incoming messages before the agent sees them.
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub async fn run(&self, conversation: Vec<Message>) -> Result<RunOutput> {
        let run_id = Uuid::new_v4();
        let span = info_span!("single_run", %run_id, agent = %self.agent.name());
        async move {
            let input_len = conversation.len();
            let mut history = match &self.executor {
                Some(executor) => {
                    let processed = executor.process(conversation);
                    debug!(
                        executor = executor.name(),
                        added = processed.len().saturating_sub(input_len),
                        "pre-processing done"
                    );
                    processed
                }
                None => conversation,
            };

            let turn = self.agent.respond(&history).await?;
            let turn_usage = turn.usage;
            let output = turn
                .final_message()
                .cloned()
                .unwrap_or_else(|| Message::assistant("").with_author(self.agent.name()));
            history.extend(turn.messages);

            Ok(RunOutput {
                run_id,
                messages: history.split_off(input_len.min(history.len())),
                output,
                output_agent: self.agent.name().to_string(),
                turns: vec![TurnRecord {
                    agent: self.agent.name().to_string(),
                    handoff_to: None,
                }],
                usage: turn_usage,
            })
        }
        .instrument(span)
        .await
    }
}
