mod cli;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use cli::{Cli, Commands};
use toolweave::config::{self, AppConfig, ConfigError};
use toolweave::uploads::FileRecord;
use toolweave::{init_tracing, Orchestrator, TurnRequest};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_stderr)?;

    let config = resolve_config(cli.config.as_deref())?;
    let orchestrator = Orchestrator::from_config(&config)
        .await
        .context("failed to start orchestrator")?;

    let outcome = run(&orchestrator, cli.command).await;
    orchestrator.shutdown().await;
    outcome
}

async fn run(orchestrator: &Orchestrator, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Ask {
            message,
            files,
            conversation,
            model,
        } => {
            if let Some(model) = model {
                orchestrator.switch_model(&model).await?;
            }
            let response = orchestrator
                .process_turn(TurnRequest {
                    conversation_id: conversation,
                    message,
                    files: file_records(&files)?,
                })
                .await;
            print_json(&response)
        }
        Commands::Chat { files } => chat(orchestrator, file_records(&files)?).await,
        Commands::Tool {
            tool_id,
            message,
            files,
            params,
        } => {
            let result = orchestrator
                .run_tool(&tool_id, &message, &file_records(&files)?, params.into_iter().collect())
                .await?;
            print_json(&result)
        }
        Commands::Tools => print_json(&orchestrator.list_tools().await),
        Commands::Models => print_json(&orchestrator.list_models()),
        Commands::Health => print_json(&orchestrator.model_health().await?),
    }
}

/// Line-by-line session in one conversation.
async fn chat(orchestrator: &Orchestrator, files: Vec<FileRecord>) -> anyhow::Result<()> {
    let mut conversation_id: Option<String> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Some(model) = line.strip_prefix("/model ") {
            match orchestrator.switch_model(model.trim()).await {
                Ok(descriptor) => println!("active model: {}", descriptor.id),
                Err(e) => eprintln!("error: {e}"),
            }
            continue;
        }
        if line == "/history" {
            match conversation_id.as_deref().map(|id| orchestrator.conversation(id)) {
                Some(Ok(turns)) => print_json(&turns)?,
                Some(Err(e)) => eprintln!("error: {e}"),
                None => eprintln!("no conversation yet"),
            }
            continue;
        }

        let response = orchestrator
            .process_turn(TurnRequest {
                conversation_id: conversation_id.clone(),
                message: line.to_string(),
                files: files.clone(),
            })
            .await;
        conversation_id = Some(response.conversation_id.clone());
        println!("{}", response.response);
        if let Some(error) = &response.error {
            eprintln!("error: {error}");
        }
    }
    Ok(())
}

/// Explicit path, else search upward from the cwd, else built-in defaults.
fn resolve_config(explicit: Option<&Path>) -> anyhow::Result<AppConfig> {
    if let Some(path) = explicit {
        return Ok(config::load_config(path)?);
    }
    let cwd = std::env::current_dir().context("cannot read current directory")?;
    match config::find_config_path(&cwd) {
        Ok(path) => Ok(config::load_config(&path)?),
        Err(ConfigError::NotFound { .. }) => {
            tracing::warn!("no toolweave.yaml found, using defaults");
            Ok(AppConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}

fn file_records(paths: &[PathBuf]) -> anyhow::Result<Vec<FileRecord>> {
    paths
        .iter()
        .map(|p| FileRecord::from_path(p).with_context(|| format!("cannot read {}", p.display())))
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
