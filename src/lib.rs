//! # Agentic recipes
//!
//! A multi-agent kitchen assistant built from Tower services. Agents are
//! named personas with instructions and typed tools. They are composed into
//! workflows that are registered by name and run against a conversation:
//!
//! - **Handoff**: agents transfer control along declared edges through
//!   synthesized `handoff_to_<agent>` tools; the run ends when an agent
//!   replies without handing off.
//! - **Group chat**: a picker chooses the next speaker until it returns none.
//! - **Sequential**: each agent answers in turn, seeing everything before it.
//! - **Single**: one agent, optionally behind a context executor such as
//!   keyword retrieval.
//!
//! The model is any `Service<ModelRequest, Response = ModelReply>`; the
//! OpenAI chat completions API is the production backend.
//!
//! ```rust,no_run
//! use agentic_recipes::{build_registry, KitchenConfig, KitchenServices, Message};
//!
//! # async fn example() -> Result<(), agentic_recipes::WorkflowError> {
//! let config = KitchenConfig::from_env()?;
//! let services = KitchenServices::from_config(&config)?;
//! let registry = build_registry(&services, &config)?;
//!
//! let out = registry
//!     .run(vec![Message::user("Heat my soup for two minutes")], "kitchen")
//!     .await?;
//! println!("{}: {}", out.output_agent, out.output.content);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod codec;
pub mod config;
pub mod core;
pub mod error;
pub mod groups;
pub mod items;
pub mod kitchen;
pub mod observability;
pub mod provider;
pub mod recipes;
pub mod registry;
pub mod retrieval;
pub mod telemetry;
pub mod tools;

pub use agent::{Agent, AgentBuilder, AgentTurn};
pub use config::{ConfigError, KitchenConfig};
pub use core::{tool_typed, ToolDef, ToolRouter};
pub use error::{Result, WorkflowError};
pub use groups::{
    GroupChatBuilder, GroupChatWorkflow, HandoffBuilder, HandoffEdge, HandoffWorkflow, RunOutput,
    SequentialBuilder, SequentialWorkflow, SingleAgentWorkflow, Workflow,
};
pub use items::{Message, Role, ToolCall};
pub use kitchen::{build_registry, KitchenServices};
pub use provider::{shared, ModelReply, ModelRequest, OpenAIProvider, SharedModel, ToolSpec};
pub use registry::WorkflowRegistry;
pub use retrieval::{Executor, KeywordRetriever};
