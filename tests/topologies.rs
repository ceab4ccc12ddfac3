//! Group chat, sequential and single-agent workflows through the registry.

use std::sync::Arc;

use agentic_recipes::items::{Role, ToolCall};
use agentic_recipes::provider::ScriptedProvider;
use agentic_recipes::recipes::{PANCAKES, RAGU};
use agentic_recipes::retrieval::NO_RECIPE_PROVIDED;
use agentic_recipes::tools::{InMemoryMusicPlayer, SimulatedMicrowave};
use agentic_recipes::{
    build_registry, shared, Agent, GroupChatBuilder, KitchenConfig, KitchenServices, Message,
    ModelReply, WorkflowRegistry,
};
use serde_json::json;

fn kitchen(provider: &ScriptedProvider) -> WorkflowRegistry {
    let services = KitchenServices::simulated(shared(provider.clone()));
    build_registry(&services, &KitchenConfig::default()).unwrap()
}

#[tokio::test]
async fn round_robin_with_one_iteration_lets_only_the_first_agent_speak() {
    let provider = ScriptedProvider::new(vec![ModelReply::text("from a")]);
    let a = Agent::builder("a", shared(provider.clone())).build().unwrap();
    let b = Agent::builder("b", shared(provider.clone())).build().unwrap();
    let mut registry = WorkflowRegistry::new();
    registry
        .register(
            "chat",
            GroupChatBuilder::round_robin(1)
                .participants([&a, &b])
                .build()
                .unwrap(),
        )
        .unwrap();

    let out = registry.run(vec![Message::user("hi")], "chat").await.unwrap();
    assert_eq!(out.speakers(), vec!["a"]);
    assert_eq!(out.output.content, "from a");
    assert_eq!(provider.requests().await.len(), 1);
}

#[tokio::test]
async fn round_robin_cycles_and_answers_with_the_last_speaker() {
    let provider = ScriptedProvider::new(vec![
        ModelReply::text("one"),
        ModelReply::text("two"),
        ModelReply::text("three"),
    ]);
    let a = Agent::builder("a", shared(provider.clone())).build().unwrap();
    let b = Agent::builder("b", shared(provider.clone())).build().unwrap();
    let chat = GroupChatBuilder::round_robin(3)
        .participant(&a)
        .participant(&b)
        .build()
        .unwrap();

    let out = chat.run(vec![Message::user("hi")]).await.unwrap();
    assert_eq!(out.speakers(), vec!["a", "b", "a"]);
    assert_eq!(out.output_agent, "a");
    assert_eq!(out.output.content, "three");
    assert_eq!(out.messages.len(), 3);
}

#[tokio::test]
async fn chef_chat_answers_once() {
    let provider = ScriptedProvider::new(vec![ModelReply::text("Boil the pasta first.")]);
    let out = kitchen(&provider)
        .run(vec![Message::user("How do I cook pasta?")], "chef")
        .await
        .unwrap();
    assert_eq!(out.speakers(), vec!["chef"]);
    assert_eq!(out.output.content, "Boil the pasta first.");
}

#[tokio::test]
async fn agentic_rag_passes_research_to_the_writer() {
    let provider = ScriptedProvider::new(vec![
        ModelReply::tool_calls(vec![ToolCall::new(
            "c1",
            "search_recipe",
            json!({ "recipe_title": "Pancakes" }),
        )]),
        ModelReply::text("Found a pancake recipe."),
        ModelReply::text("Vegan pancakes for two."),
    ]);
    let out = kitchen(&provider)
        .run(vec![Message::user("Vegan pancakes for two?")], "agentic-rag")
        .await
        .unwrap();

    assert_eq!(out.speakers(), vec!["recipe-researcher", "recipe-writer"]);
    assert_eq!(out.output_agent, "recipe-writer");
    assert_eq!(out.output.content, "Vegan pancakes for two.");

    let requests = provider.requests().await;
    assert_eq!(requests.len(), 3);
    let writer_saw_recipe = requests[2]
        .messages
        .iter()
        .any(|m| m.role == Role::Tool && m.content == PANCAKES);
    assert!(writer_saw_recipe);
    assert!(requests[2].tools.is_empty());
}

#[tokio::test]
async fn rag_appends_the_recipe_when_the_keyword_matches() {
    let provider = ScriptedProvider::new(vec![ModelReply::text("Brown the meat.")]);
    let out = kitchen(&provider)
        .run(vec![Message::user("How do I make RAGU?")], "rag")
        .await
        .unwrap();
    assert_eq!(out.output.content, "Brown the meat.");

    let request = &provider.requests().await[0];
    let last = request.messages.last().unwrap();
    assert_eq!(last.role, Role::System);
    assert_eq!(last.content, RAGU);
    assert!(request.messages[0].content.contains("apologize"));
}

#[tokio::test]
async fn rag_marks_missing_recipes() {
    let provider = ScriptedProvider::new(vec![ModelReply::text("Sorry, I have no recipe for that.")]);
    kitchen(&provider)
        .run(vec![Message::user("Pancakes please")], "rag")
        .await
        .unwrap();

    let request = &provider.requests().await[0];
    assert_eq!(request.messages.last().unwrap().content, NO_RECIPE_PROVIDED);
}

#[tokio::test]
async fn plain_agent_has_no_system_prompt() {
    let provider = ScriptedProvider::new(vec![ModelReply::text("Hi!")]);
    let out = kitchen(&provider)
        .run(vec![Message::user("hello")], "plain")
        .await
        .unwrap();
    assert_eq!(out.output.author(), Some("plain"));

    let request = &provider.requests().await[0];
    assert_eq!(request.messages.len(), 1);
    assert_eq!(request.messages[0].role, Role::User);
}

#[tokio::test]
async fn dj_controls_the_music() {
    let provider = ScriptedProvider::new(vec![
        ModelReply::tool_calls(vec![ToolCall::new("c1", "resume_music", json!({}))]),
        ModelReply::text("Music is on."),
    ]);
    let player = Arc::new(InMemoryMusicPlayer::default());
    let services = KitchenServices {
        model: shared(provider.clone()),
        microwave: Arc::new(SimulatedMicrowave::new()),
        music: player.clone(),
    };
    let registry = build_registry(&services, &KitchenConfig::default()).unwrap();

    let out = registry
        .run(vec![Message::user("Play some music")], "tool")
        .await
        .unwrap();
    assert_eq!(out.output.content, "Music is on.");
    assert!(player.is_playing());
    assert!(out
        .messages
        .iter()
        .any(|m| m.role == Role::Tool && m.content == "true"));
}
