//! `animus` - cognitive orchestration kernel for an embodied conversational agent
//!
//! Replays recorded event logs through the kernel, runs an offline chat
//! session against the full runtime, and shows the effective configuration.

use anyhow::{Context, Result};
use clap::Parser;
use console::Style;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use animus_core::AnimusConfig;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let mut config = AnimusConfig::from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            config.apply_env();
            config
        }
        None => AnimusConfig::load(),
    };
    animus_core::logger::init(&config.logging);

    match cli.command {
        Commands::Replay { file, json } => cli::replay::handle(&file, json)?,

        Commands::Chat {
            script,
            agent_name,
            autonomy,
        } => cli::chat::handle(config, script, agent_name, autonomy).await?,

        Commands::Config { print } => handle_config(&config, print)?,
    }

    Ok(())
}

fn handle_config(config: &AnimusConfig, print: bool) -> Result<()> {
    if print {
        print!("{}", toml::to_string_pretty(config)?);
        return Ok(());
    }

    let blue = Style::new().blue();
    let path = AnimusConfig::default_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(no config directory)".to_string());
    println!("{} {}", blue.apply_to("config file:"), path);
    println!("{} {} ({})", blue.apply_to("agent:"), config.agent.name, config.agent.id);
    println!(
        "{} {} retries, {} tool(s), strict facts {}",
        blue.apply_to("guard:"),
        config.guard.max_retries,
        config.guard.tools.len(),
        config.guard.strict_facts
    );
    println!(
        "{} every {}-{} ms, silence {} ms, max unreplied {}",
        blue.apply_to("autonomy:"),
        config.autonomy.base_interval_ms,
        config.autonomy.max_interval_ms,
        config.autonomy.min_silence_ms,
        config.autonomy.max_unreplied
    );
    println!("Run `animus config --print` for the full file.");
    Ok(())
}
