//! Local-process backend: a long-lived worker speaking line-delimited JSON.
//!
//! Protocol:
//! - The worker prints its ready token on its own line once it accepts work.
//! - Each request is one JSON line `{prompt, system_prompt, max_tokens, temperature}`.
//! - Each response is one JSON line `{success, response?, error?}`.
//! - Anything on stdout that is not a response object is skipped.
//!
//! A single task owns the worker's stdin and stdout and serves one request at
//! a time, so responses correlate with requests by arrival order. A caller
//! that times out detaches: a request still queued is dropped unsent, and a
//! late reply to one already sent is read and discarded.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};

use super::backend::TextGenerator;
use super::errors::ModelError;
use super::types::ModelConfig;

/// Pending requests allowed to queue in front of the worker task.
const CALL_QUEUE_DEPTH: usize = 16;

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WorkerRequest<'a> {
    prompt: &'a str,
    system_prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct WorkerResponse {
    success: bool,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// One request handed to the worker task.
struct WorkerCall {
    line: String,
    reply: oneshot::Sender<Result<String, ModelError>>,
}

// ─── LocalProcessBackend ─────────────────────────────────────────────────────

/// Handle to a running worker. The process is killed when this is dropped.
pub struct LocalProcessBackend {
    model_id: String,
    endpoint: String,
    calls: mpsc::Sender<WorkerCall>,
    max_tokens: u32,
    temperature: f32,
    request_timeout: Duration,
    /// Held for `kill_on_drop`.
    _child: Child,
}

impl LocalProcessBackend {
    /// Spawn the worker and wait for its ready token.
    pub async fn spawn(config: &ModelConfig) -> Result<Self, ModelError> {
        let command = config.command.as_deref().ok_or_else(|| ModelError::Config {
            reason: format!("model '{}' has no command", config.id),
        })?;
        let endpoint = format!("process:{command}");

        let mut cmd = Command::new(command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| ModelError::ServiceUnavailable {
            endpoint: endpoint.clone(),
            reason: format!("failed to spawn worker: {e}"),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| ModelError::ServiceUnavailable {
            endpoint: endpoint.clone(),
            reason: "failed to capture stdin".into(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| ModelError::ServiceUnavailable {
            endpoint: endpoint.clone(),
            reason: "failed to capture stdout".into(),
        })?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(config.id.clone(), stderr));
        }

        let mut reader = BufReader::new(stdout);
        let startup = config.startup_timeout();
        match tokio::time::timeout(
            startup,
            wait_for_ready(&mut reader, &config.ready_token, &endpoint),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                let _ = child.kill().await;
                return Err(ModelError::Timeout {
                    duration_secs: startup.as_secs(),
                });
            }
        }

        let (tx, rx) = mpsc::channel(CALL_QUEUE_DEPTH);
        tokio::spawn(run_worker_loop(stdin, reader, rx, endpoint.clone()));

        tracing::info!(model = %config.id, endpoint = %endpoint, "local worker ready");

        Ok(Self {
            model_id: config.id.clone(),
            endpoint,
            calls: tx,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            request_timeout: config.request_timeout(),
            _child: child,
        })
    }
}

#[async_trait]
impl TextGenerator for LocalProcessBackend {
    async fn generate(&self, prompt: &str, system_prompt: &str) -> Result<String, ModelError> {
        let request = WorkerRequest {
            prompt,
            system_prompt,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let line = serde_json::to_string(&request).map_err(|e| ModelError::Config {
            reason: format!("failed to serialize worker request: {e}"),
        })?;

        // Queueing counts against the deadline too: a hung worker stops
        // draining the channel.
        let (reply, pending) = oneshot::channel();
        let call = async {
            self.calls
                .send(WorkerCall { line, reply })
                .await
                .map_err(|_| self.unavailable("worker task has stopped"))?;
            pending
                .await
                .map_err(|_| self.unavailable("worker task dropped the request"))?
        };

        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    model = %self.model_id,
                    timeout_secs = self.request_timeout.as_secs(),
                    "local worker request timed out"
                );
                Err(ModelError::Timeout {
                    duration_secs: self.request_timeout.as_secs(),
                })
            }
        }
    }
}

impl LocalProcessBackend {
    fn unavailable(&self, reason: &str) -> ModelError {
        ModelError::ServiceUnavailable {
            endpoint: self.endpoint.clone(),
            reason: reason.to_string(),
        }
    }
}

// ─── Worker task ─────────────────────────────────────────────────────────────

async fn wait_for_ready(
    reader: &mut BufReader<ChildStdout>,
    token: &str,
    endpoint: &str,
) -> Result<(), ModelError> {
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader
            .read_line(&mut line)
            .await
            .map_err(|e| ModelError::ServiceUnavailable {
                endpoint: endpoint.to_string(),
                reason: format!("failed to read worker stdout: {e}"),
            })?;
        if n == 0 {
            return Err(ModelError::ServiceUnavailable {
                endpoint: endpoint.to_string(),
                reason: "worker exited before reporting ready".into(),
            });
        }
        if line.trim() == token {
            return Ok(());
        }
        tracing::debug!(endpoint, line = %line.trim(), "worker startup output");
    }
}

/// Serve calls one at a time until the backend is dropped.
async fn run_worker_loop(
    mut stdin: ChildStdin,
    mut reader: BufReader<ChildStdout>,
    mut calls: mpsc::Receiver<WorkerCall>,
    endpoint: String,
) {
    let mut exited = false;
    while let Some(call) = calls.recv().await {
        // Caller already timed out; don't replay its request to the worker.
        if call.reply.is_closed() {
            tracing::debug!(endpoint = %endpoint, "skipping abandoned worker request");
            continue;
        }
        let outcome = if exited {
            Err(ModelError::ServiceUnavailable {
                endpoint: endpoint.clone(),
                reason: "worker has exited".into(),
            })
        } else {
            exchange(&mut stdin, &mut reader, &call.line, &endpoint).await
        };

        if matches!(outcome, Err(ModelError::ServiceUnavailable { .. })) {
            exited = true;
        }
        // The caller may have timed out and gone away.
        let _ = call.reply.send(outcome);
    }
}

async fn exchange(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    request: &str,
    endpoint: &str,
) -> Result<String, ModelError> {
    let io_err = |reason: String| ModelError::ServiceUnavailable {
        endpoint: endpoint.to_string(),
        reason,
    };

    stdin
        .write_all(request.as_bytes())
        .await
        .map_err(|e| io_err(format!("failed to write to worker: {e}")))?;
    stdin
        .write_all(b"\n")
        .await
        .map_err(|e| io_err(format!("failed to write to worker: {e}")))?;
    stdin
        .flush()
        .await
        .map_err(|e| io_err(format!("failed to flush worker stdin: {e}")))?;

    let mut line = String::new();
    loop {
        line.clear();
        let n = reader
            .read_line(&mut line)
            .await
            .map_err(|e| io_err(format!("failed to read worker stdout: {e}")))?;
        if n == 0 {
            return Err(io_err("worker stdout closed (process may have exited)".into()));
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<WorkerResponse>(trimmed) {
            Ok(resp) if resp.success => return Ok(resp.response.unwrap_or_default()),
            Ok(resp) => {
                return Err(ModelError::WorkerFailed {
                    reason: resp.error.unwrap_or_else(|| "unknown worker error".into()),
                })
            }
            // Log output from the worker.
            Err(_) => continue,
        }
    }
}

async fn forward_stderr(model_id: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(model = %model_id, stderr = %line, "local worker stderr");
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
