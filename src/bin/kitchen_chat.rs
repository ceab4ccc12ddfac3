//! Interactive chat against one of the kitchen workflows.
//!
//! Usage: `kitchen_chat [workflow]` (default `kitchen`). Requires
//! `OPENAI_API_KEY`. Ctrl-C interrupts the running request and drops the
//! last user message from the conversation.

use agentic_recipes::telemetry::init_tracing;
use agentic_recipes::{build_registry, KitchenConfig, KitchenServices, Message, WorkflowError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let workflow = std::env::args().nth(1).unwrap_or_else(|| "kitchen".to_string());
    let config = KitchenConfig::from_env()?;
    let services = KitchenServices::from_config(&config)?;
    let registry = build_registry(&services, &config)?;
    registry.get(&workflow)?;

    println!(
        "Chatting with '{}' (available: {}). Type 'quit' to exit.\n",
        workflow,
        registry.names().join(", ")
    );

    let mut conversation: Vec<Message> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") {
            break;
        }

        conversation.push(Message::user(input));

        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupt.cancel();
            }
        });

        let result = registry
            .run_cancellable(conversation.clone(), &workflow, &cancel)
            .await;
        watcher.abort();

        match result {
            Ok(out) => {
                info!(
                    prompt_tokens = out.usage.prompt_tokens,
                    completion_tokens = out.usage.completion_tokens,
                    "run finished"
                );
                println!("\n{}: {}\n", out.output_agent, out.output.content);
                conversation.extend(out.messages);
            }
            Err(WorkflowError::Cancelled) => {
                conversation.pop();
                println!("\nInterrupted, last message dropped.\n");
            }
            Err(e) => {
                conversation.pop();
                error!(error = %e, "run failed");
                println!("\nError: {}\n", e);
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}
