//! Name -> workflow registry
//!
//! Workflows are registered once at startup and looked up by name per
//! incoming conversation. The registry is cheap to clone and safe to share.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Result, WorkflowError};
use crate::groups::{RunOutput, Workflow};
use crate::items::Message;

#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    workflows: HashMap<String, Workflow>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `workflow` under `name`. Names are unique.
    pub fn register(&mut self, name: impl Into<String>, workflow: impl Into<Workflow>) -> Result<()> {
        let name = name.into();
        if self.workflows.contains_key(&name) {
            return Err(WorkflowError::topology(format!(
                "workflow {} is already registered",
                name
            )));
        }
        self.workflows.insert(name, workflow.into());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Workflow> {
        self.workflows
            .get(name)
            .ok_or_else(|| WorkflowError::UnknownWorkflow {
                name: name.to_string(),
            })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.workflows.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run `conversation` through the named workflow.
    pub async fn run(&self, conversation: Vec<Message>, workflow_name: &str) -> Result<RunOutput> {
        let workflow = self.get(workflow_name)?;
        info!(workflow = workflow_name, kind = workflow.kind(), "run requested");
        workflow.run(conversation).await
    }

    /// Like `run`, but stops at the next suspension point once `cancel` fires.
    /// In-flight model and tool calls are dropped, never retried.
    pub async fn run_cancellable(
        &self,
        conversation: Vec<Message>,
        workflow_name: &str,
        cancel: &CancellationToken,
    ) -> Result<RunOutput> {
        let workflow = self.get(workflow_name)?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(workflow = workflow_name, "run cancelled");
                Err(WorkflowError::Cancelled)
            }
            result = workflow.run(conversation) => result,
        }
    }
}
