//! Command-line argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Toolweave: LLM-planned tool orchestration
#[derive(Parser)]
#[command(name = "toolweave")]
#[command(about = "Plan, run, and summarize document-processing tools with an LLM", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to toolweave.yaml (default: search upward from the current directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Write logs to stderr instead of the data directory
    #[arg(long, global = true)]
    pub log_stderr: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one turn and print the response as JSON
    Ask {
        message: String,
        /// File to upload with the message (repeatable)
        #[arg(long = "file", short = 'f')]
        files: Vec<PathBuf>,
        /// Conversation id to continue
        #[arg(long)]
        conversation: Option<String>,
        /// Activate this model before the turn
        #[arg(long)]
        model: Option<String>,
    },

    /// Interactive session over stdin; `/model <id>` switches, `/history` prints the conversation
    Chat {
        /// Files attached to every turn (repeatable)
        #[arg(long = "file", short = 'f')]
        files: Vec<PathBuf>,
    },

    /// Run one tool directly, skipping planning
    Tool {
        tool_id: String,
        #[arg(long, short = 'm', default_value = "")]
        message: String,
        #[arg(long = "file", short = 'f')]
        files: Vec<PathBuf>,
        /// Parameter override as key=value; values parse as JSON when they can
        #[arg(long = "param", short = 'p', value_parser = parse_param)]
        params: Vec<(String, serde_json::Value)>,
    },

    /// List tools with live availability
    Tools,

    /// List configured models
    Models,

    /// Health-check the active model
    Health,
}

/// Parse `key=value`. `0.5` and `true` become JSON values, anything else a string.
pub fn parse_param(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{raw}'"));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
