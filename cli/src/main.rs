use anyhow::{Context, Result};
use chatloop_core::{AgentLoop, Config, ToolRegistry, builtin_tools, create_provider};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

mod render;
mod repl;

const LOG_ENV: &str = "CHATLOOP_LOG";

#[derive(Parser)]
#[command(name = "chatloop", version)]
#[command(about = "chatloop - streaming chat agent with local tool calls", long_about = None)]
struct Cli {}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let _cli = Cli::parse();
    init_tracing();

    let config = Config::load_or_init().inspect_err(|e| {
        eprintln!("{}", console::style(format!("Error: {:#}", e)).red());
    })?;

    if !config.workspace_dir.exists() {
        std::fs::create_dir_all(&config.workspace_dir).with_context(|| {
            format!(
                "Could not create workspace at {}",
                config.workspace_dir.display()
            )
        })?;
    }

    let mut registry = ToolRegistry::new();
    registry.register_all(builtin_tools());
    tracing::info!(tools = ?registry.names(), "Tool registry ready");

    let agent = AgentLoop::new(create_provider(&config), Arc::new(registry))
        .with_max_iterations(config.max_iterations)
        .with_chunk_join(config.chunk_join)
        .with_workspace(config.workspace_dir.clone());

    let mut session = repl::Repl::new(
        BufReader::new(tokio::io::stdin()),
        std::io::stdout(),
        agent,
        config.system_prompt.clone(),
    )
    .with_interrupts(repl::ctrl_c_interrupts())
    .with_turn_timeout(config.turn_timeout_secs.map(Duration::from_secs))
    .with_exit_on_turn_error(config.exit_on_turn_error);

    session.run().await
}
