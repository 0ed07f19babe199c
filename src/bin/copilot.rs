use banking_agent_router::{agent::Orchestrator, config::AppConfig, memory::Conversation};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const EXIT_COMMANDS: [&str; 3] = ["quit", "exit", "q"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    let orchestrator = Orchestrator::from_config(&config)?;
    let mut conversation = Conversation::new(Uuid::new_v4());

    info!(
        session_id = %conversation.session_id,
        model = %config.model.model,
        operations = orchestrator.catalog().len(),
        "Banking copilot ready"
    );
    println!("Banking copilot. Type 'history' for the transcript, 'quit' to leave.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nTeller: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        if input.is_empty() {
            continue;
        }
        if EXIT_COMMANDS.contains(&input.to_lowercase().as_str()) {
            break;
        }
        if input.eq_ignore_ascii_case("history") {
            println!("{}", conversation.transcript());
            continue;
        }

        match orchestrator.run_turn(&mut conversation, input).await {
            Ok(outcome) => {
                println!("\nAgent: {}", outcome.reply);
                println!(
                    "  [tools: {}{}]",
                    outcome.routing.operation_names().join(", "),
                    if outcome.routing.fallback { " (fallback)" } else { "" }
                );
            }
            Err(e) => {
                error!(error = %e, "Turn failed");
                eprintln!("\nError: {}", e);
            }
        }
    }

    println!("Goodbye.");
    Ok(())
}
