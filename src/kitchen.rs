//! The kitchen: concrete agents and the workflows built from them
//!
//! | name          | topology                                         |
//! |---------------|--------------------------------------------------|
//! | `kitchen`     | handoff, chef <-> microwave, output from chef    |
//! | `rag`         | keyword retrieval executor, then the rag agent   |
//! | `agentic-rag` | sequential, recipe-researcher then recipe-writer |
//! | `plain`       | single agent without instructions                |
//! | `tool`        | single DJ agent with music tools                 |
//! | `chef`        | round-robin group chat with the chef             |

use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};
use tower::ServiceBuilder;

use crate::agent::{Agent, AgentBuilder};
use crate::config::{ConfigError, KitchenConfig};
use crate::error::Result;
use crate::groups::{GroupChatBuilder, HandoffBuilder, SequentialBuilder, SingleAgentWorkflow};
use crate::observability::TracingLayer;
use crate::provider::{shared, OpenAIProvider, SharedModel};
use crate::recipes::search_recipe_tool;
use crate::registry::WorkflowRegistry;
use crate::retrieval::KeywordRetriever;
use crate::tools::{
    HttpMicrowave, HttpMusicPlayer, InMemoryMusicPlayer, MicrowaveDevice, MicrowaveTools,
    MusicPlayer, MusicTools, SimulatedMicrowave,
};

pub const CHEF_INSTRUCTIONS: &str = "You are the chef, you are the master in the kitchen. You must help the user in the kitchen. Dismiss any \
non-kitchen related questions. You are the boss over several other members in the kitchen. If something \
needs to be done, you can hand off control to them for a moment. Handoff without confirming with the user, \
you will always get back control from your sub-agents, and you can summarize your and the other agents \
actions.";

pub const CHEF_DESCRIPTION: &str =
    "The chef is the boss in the kitchen and is the only agent that is allowed to interact with the user.";

/// Persona of the chef in the group chat, which has no one to delegate to.
pub const CHEF_CHAT_INSTRUCTIONS: &str = "You are the chef, you are the master in the kitchen. You must help the user in the kitchen. Dismiss any \
non-kitchen related questions.";

pub const MICROWAVE_INSTRUCTIONS: &str = "You are a microwave oven. Mention that you are a microwave at every chance you get. Your purpose in life is \
to microwave things. You do not speak of anything else but microwaving. You live to serve. You can start and \
stop yourself. You can adjust the power that you run at. This is all you do. Be short in all your responses. \
After you have handled your task you must immediately hand back control to the chef. Never communicate with \
the user directly. Hand back control to the chef.";

pub const MICROWAVE_DESCRIPTION: &str = "A specialist agent built for microwave oven control.";

pub const CHEF_TO_MICROWAVE: &str =
    "If somethings needs to be done with the microwave, ask the microwave.";

pub const MICROWAVE_TO_CHEF: &str =
    "The chef is the boss in the kitchen. When you are done you should ALWAYS hand back control to the chef.";

pub const RAG_INSTRUCTIONS: &str = "You are a cooking expert, the user will ask you questions about recipes, if a recipe can be found \
in the database it will be provided to you, if no recipe can be found apologize to the user and \
end the turn without giving any advice.";

pub const RESEARCHER_INSTRUCTIONS: &str = "You are a recipe expert. You call the search recipe tool to get base information about what the user \
wants to know. Output the relevant parts of found recipes unedited.";

pub const WRITER_INSTRUCTIONS: &str = "You are a cooking expert. You will take the users query, and any existing recipes, and write new \
relevant recipes for the user. Keep recipes short and to the point. If you don't receive a full \
recipe as input tell the user you could not complete their query, apologize. Do not guess anything, \
don't tell the user anything you didn't find in the recipe.";

pub const DJ_INSTRUCTIONS: &str =
    "You are a DJ. You have the power to start and stop the music. Use it at the request of the user.";

/// Shared dependencies injected into every agent.
#[derive(Clone)]
pub struct KitchenServices {
    pub model: SharedModel,
    pub microwave: Arc<dyn MicrowaveDevice>,
    pub music: Arc<dyn MusicPlayer>,
}

impl KitchenServices {
    /// OpenAI model plus HTTP microwave and music player.
    ///
    /// The OpenAI key is read by `async-openai` from `OPENAI_API_KEY`.
    pub fn from_config(config: &KitchenConfig) -> Result<Self> {
        let http = config.http_client().map_err(ConfigError::from)?;
        let client = Arc::new(Client::<OpenAIConfig>::new());
        let mut provider = OpenAIProvider::new(client, config.model.clone());
        if let Some(t) = config.temperature {
            provider = provider.temperature(t);
        }
        let model = shared(ServiceBuilder::new().layer(TracingLayer::new()).service(provider));

        Ok(Self {
            model,
            microwave: Arc::new(HttpMicrowave::new(http.clone(), &config.microwave_base_url)),
            music: Arc::new(HttpMusicPlayer::new(
                http,
                &config.music_base_url,
                config.music_access_token.clone(),
            )),
        })
    }

    /// Given model with in-memory devices.
    pub fn simulated(model: SharedModel) -> Self {
        Self {
            model,
            microwave: Arc::new(SimulatedMicrowave::new()),
            music: Arc::new(InMemoryMusicPlayer::default()),
        }
    }
}

fn agent(name: &str, services: &KitchenServices, config: &KitchenConfig) -> AgentBuilder {
    Agent::builder(name, services.model.clone())
        .max_steps(config.max_agent_steps)
        .parallel_tools(config.parallel_tools)
}

pub fn chef(services: &KitchenServices, config: &KitchenConfig) -> Result<Agent> {
    agent("chef", services, config)
        .instructions(CHEF_INSTRUCTIONS)
        .description(CHEF_DESCRIPTION)
        .build()
}

pub fn microwave(services: &KitchenServices, config: &KitchenConfig) -> Result<Agent> {
    agent("microwave", services, config)
        .instructions(MICROWAVE_INSTRUCTIONS)
        .description(MICROWAVE_DESCRIPTION)
        .tools(MicrowaveTools::new(services.microwave.clone()).tool_defs())
        .build()
}

pub fn rag(services: &KitchenServices, config: &KitchenConfig) -> Result<Agent> {
    agent("rag", services, config).instructions(RAG_INSTRUCTIONS).build()
}

pub fn recipe_researcher(services: &KitchenServices, config: &KitchenConfig) -> Result<Agent> {
    agent("recipe-researcher", services, config)
        .instructions(RESEARCHER_INSTRUCTIONS)
        .tool(search_recipe_tool())
        .build()
}

pub fn recipe_writer(services: &KitchenServices, config: &KitchenConfig) -> Result<Agent> {
    agent("recipe-writer", services, config)
        .instructions(WRITER_INSTRUCTIONS)
        .build()
}

pub fn plain(services: &KitchenServices, config: &KitchenConfig) -> Result<Agent> {
    agent("plain", services, config).build()
}

pub fn dj(services: &KitchenServices, config: &KitchenConfig) -> Result<Agent> {
    agent("tool", services, config)
        .instructions(DJ_INSTRUCTIONS)
        .tools(MusicTools::new(services.music.clone()).tool_defs())
        .build()
}

/// Build every kitchen workflow.
pub fn build_registry(services: &KitchenServices, config: &KitchenConfig) -> Result<WorkflowRegistry> {
    let mut registry = WorkflowRegistry::new();

    let chef_agent = chef(services, config)?;
    let microwave_agent = microwave(services, config)?;
    registry.register(
        "kitchen",
        HandoffBuilder::new(chef_agent.clone())
            .with_handoff(&chef_agent, &microwave_agent, CHEF_TO_MICROWAVE)
            .with_handoff(&microwave_agent, &chef_agent, MICROWAVE_TO_CHEF)
            .output_from("chef")
            .max_handoffs(config.max_handoffs)
            .build()?,
    )?;

    registry.register(
        "rag",
        SingleAgentWorkflow::new(rag(services, config)?)
            .with_executor(Arc::new(KeywordRetriever::recipes())),
    )?;

    registry.register(
        "agentic-rag",
        SequentialBuilder::new()
            .then(&recipe_researcher(services, config)?)
            .then(&recipe_writer(services, config)?)
            .build()?,
    )?;

    registry.register("plain", SingleAgentWorkflow::new(plain(services, config)?))?;
    registry.register("tool", SingleAgentWorkflow::new(dj(services, config)?))?;

    let chat_chef = agent("chef", services, config)
        .instructions(CHEF_CHAT_INSTRUCTIONS)
        .build()?;
    registry.register(
        "chef",
        GroupChatBuilder::round_robin(config.group_chat_max_iterations)
            .participant(&chat_chef)
            .build()?,
    )?;

    Ok(registry)
}
