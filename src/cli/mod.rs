//! CLI argument parsing using clap 4.x derive macros

pub mod chat;
pub mod replay;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Cognitive orchestration kernel for an embodied conversational agent
#[derive(Parser, Debug)]
#[command(name = "animus")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to <config dir>/animus/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a recorded event log through the kernel and show the result
    Replay {
        /// JSON file: an array of events, or {"state": ..., "events": [...]}
        file: PathBuf,

        /// Print the final state as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Talk to the agent (offline model) through the full runtime
    Chat {
        /// Read input lines from a file instead of stdin
        #[arg(short, long)]
        script: Option<PathBuf>,

        /// Override the agent name
        #[arg(long)]
        agent_name: Option<String>,

        /// Let the agent speak unprompted between inputs
        #[arg(long)]
        autonomy: bool,
    },

    /// Show configuration
    Config {
        /// Print the effective configuration as TOML
        #[arg(long)]
        print: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_replay() {
        let cli = Cli::parse_from(["animus", "replay", "events.json", "--json"]);
        match cli.command {
            Commands::Replay { file, json } => {
                assert_eq!(file, PathBuf::from("events.json"));
                assert!(json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_chat_with_global_config() {
        let cli = Cli::parse_from(["animus", "chat", "--agent-name", "Nyx", "--config", "a.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("a.toml")));
        assert!(matches!(
            cli.command,
            Commands::Chat { agent_name: Some(ref name), autonomy: false, .. } if name == "Nyx"
        ));
    }
}
