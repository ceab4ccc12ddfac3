//! Sequential pipeline: each agent sees the input plus everything the agents
//! before it produced.

use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use super::{require_distinct, RunOutput, TurnRecord};
use crate::agent::Agent;
use crate::error::{Result, WorkflowError};
use crate::items::Message;
use crate::observability::Usage;

#[derive(Default)]
pub struct SequentialBuilder {
    agents: Vec<Agent>,
}

impl SequentialBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, agent: &Agent) -> Self {
        self.agents.push(agent.clone());
        self
    }

    pub fn build(self) -> Result<SequentialWorkflow> {
        if self.agents.is_empty() {
            return Err(WorkflowError::topology("sequential workflow needs at least one agent"));
        }
        require_distinct(self.agents.iter().map(|a| a.name()))?;
        Ok(SequentialWorkflow {
            agents: self.agents,
        })
    }
}

pub struct SequentialWorkflow {
    agents: Vec<Agent>,
}

impl SequentialWorkflow {
    pub fn stages(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.name()).collect()
    }

    pub async fn run(&self, conversation: Vec<Message>) -> Result<RunOutput> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sequential_run", %run_id, stages = self.agents.len());
        async move {
            let input_len = conversation.len();
            let mut history = conversation;
            let mut turns = Vec::with_capacity(self.agents.len());
            let mut last: Option<Message> = None;
            let mut usage = Usage::default();

            for agent in &self.agents {
                let turn = agent.respond(&history).await?;
                debug!(agent = %agent.name(), produced = turn.messages.len(), "stage finished");
                usage += turn.usage;
                last = turn.final_message().cloned();
                history.extend(turn.messages);
                turns.push(TurnRecord {
                    agent: agent.name().to_string(),
                    handoff_to: None,
                });
            }

            // build() guarantees at least one stage
            let output_agent = turns
                .last()
                .map(|t| t.agent.clone())
                .unwrap_or_default();
            let output = last.unwrap_or_else(|| Message::assistant("").with_author(output_agent.clone()));
            info!(output_agent = %output_agent, "sequential run complete");
            Ok(RunOutput {
                run_id,
                messages: history.split_off(input_len),
                output,
                output_agent,
                turns,
                usage,
            })
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{shared, ModelReply, ScriptedProvider};

    #[test]
    fn empty_pipeline_is_rejected() {
        assert!(matches!(
            SequentialBuilder::new().build(),
            Err(WorkflowError::InvalidTopology { .. })
        ));
    }

    #[tokio::test]
    async fn single_stage_pipeline_answers_directly() {
        let provider = ScriptedProvider::new(vec![ModelReply::text("only stage")]);
        let a = Agent::builder("a", shared(provider)).build().unwrap();
        let wf = SequentialBuilder::new().then(&a).build().unwrap();
        let out = wf.run(vec![Message::user("go")]).await.unwrap();
        assert_eq!(out.output.content, "only stage");
        assert_eq!(wf.stages(), vec!["a"]);
    }
}
