//! Interactive console for the agent
//!
//! Wires settings, the LLM provider, the bundled tools and the job
//! scheduler into an interaction driver, then either answers a single
//! `--message` or runs the console loop.

mod commands;
mod console;

use std::path::PathBuf;
use std::sync::Arc;

use agent_core::{ConversationStore, InteractionDriver, LlmDecisionProducer, ToolDispatcher};
use agent_runtime::{Scheduler, Settings, build_provider};
use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::console::Console;

#[derive(Parser)]
#[command(name = "agent", about = "Tool-using conversational agent", version)]
struct Cli {
    /// Answer one message and exit instead of entering interactive mode
    #[arg(short, long)]
    message: Option<String>,

    /// Start from a saved conversation file
    #[arg(short, long)]
    load: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Logs go to stderr. `RUST_LOG` wins over `LOG_LEVEL`; `--verbose` forces debug.
fn init_tracing(log_level: Option<&str>, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.unwrap_or("info")))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load().context("failed to load settings")?;
    init_tracing(settings.log_level.as_deref(), cli.verbose);
    info!(env = %settings.env, provider = ?settings.provider, model = %settings.model, "Starting agent");

    let config = Arc::new(settings.agent_config()?);

    let provider = build_provider(&settings)?;
    match provider.health_check().await {
        Ok(true) => info!(provider = provider.name(), "Provider reachable"),
        Ok(false) | Err(_) => warn!(provider = provider.name(), "Provider not reachable; turns will fall back to error replies"),
    }
    let producer = Arc::new(LlmDecisionProducer::new(provider, config.clone()));

    let scheduler = Scheduler::new();
    let registry = agent_tools::standard_registry(&scheduler, producer.clone());
    info!(tools = ?registry.names(), "Registered tools");
    let dispatcher: Arc<dyn ToolDispatcher> = Arc::new(registry);
    scheduler.bind(&dispatcher)?;

    let driver = InteractionDriver::new(producer, dispatcher, config.clone());

    let mut store = match &cli.load {
        Some(path) => ConversationStore::load_from_file(path, config.max_history),
        None => ConversationStore::new(config.max_history),
    };

    if let Some(message) = cli.message {
        let response = driver.run_turn(&message, &mut store).await;
        println!("{response}");
        return Ok(());
    }

    scheduler.start().await?;
    Console::new(driver, scheduler, store, settings.session_dir).run().await
}
