//! Error types for workflow runs

use thiserror::Error;
use tower::BoxError;

use crate::config::ConfigError;

/// Result type alias for workflow operations
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Run-level and construction-level failures.
///
/// Tool failures never show up here: they are converted to in-band text so
/// the model can react to them.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The chat-completion capability failed. Fatal to the run.
    #[error("Model error: {0}")]
    Model(BoxError),

    /// A group-chat picker failed to choose the next speaker
    #[error("Routing error: {0}")]
    Routing(BoxError),

    /// Handoff loop exhaustion
    #[error("Too many handoffs: limit of {max_handoffs} exceeded")]
    MaxHandoffsExceeded { max_handoffs: usize },

    /// An agent kept requesting tools past its step bound
    #[error("Agent {agent} exceeded {max_steps} model calls in a single turn")]
    MaxStepsExceeded { agent: String, max_steps: usize },

    /// A workflow description that cannot be built
    #[error("Invalid topology: {message}")]
    InvalidTopology { message: String },

    /// Two tools with the same name on one agent
    #[error("Agent {agent} declares tool {tool} more than once")]
    DuplicateTool { agent: String, tool: String },

    /// No workflow registered under the requested name
    #[error("Unknown workflow: {name}")]
    UnknownWorkflow { name: String },

    /// The caller cancelled the run
    #[error("Run cancelled")]
    Cancelled,

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkflowError {
    pub(crate) fn topology(message: impl Into<String>) -> Self {
        WorkflowError::InvalidTopology {
            message: message.into(),
        }
    }

    /// Whether the error is an operational failure rather than a bad setup.
    pub fn is_run_failure(&self) -> bool {
        matches!(
            self,
            WorkflowError::Model(_)
                | WorkflowError::Routing(_)
                | WorkflowError::MaxHandoffsExceeded { .. }
                | WorkflowError::MaxStepsExceeded { .. }
                | WorkflowError::Cancelled
        )
    }
}
