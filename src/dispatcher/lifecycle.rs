//! Capability server process lifecycle.
//!
//! Servers are launched only when their health probe fails. After launch the
//! health URL is polled on a fixed interval until it answers 200 or the
//! attempt budget runs out.

use std::process::Stdio;
use std::time::Duration;

use reqwest::Client as HttpClient;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use super::container::probe_health;
use super::errors::DispatchError;
use super::types::CapabilityServerConfig;

/// Timeout for a launched server to exit after being killed.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Launch a server process. Output is forwarded to the debug log.
pub fn launch_server(name: &str, config: &CapabilityServerConfig) -> Result<Child, DispatchError> {
    let command = config
        .command
        .as_deref()
        .ok_or_else(|| DispatchError::ServiceUnavailable {
            target: config.health_url(),
            reason: format!("server '{name}' is unreachable and has no launch command"),
        })?;

    let mut cmd = Command::new(command);
    cmd.args(&config.args)
        .envs(&config.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &config.cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|e| DispatchError::ServiceUnavailable {
        target: config.health_url(),
        reason: format!("failed to launch server '{name}': {e}"),
    })?;

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_output(name.to_string(), stdout));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_output(name.to_string(), stderr));
    }

    tracing::info!(server = name, command, pid = ?child.id(), "launched capability server");
    Ok(child)
}

/// Poll `url` until it answers 200, at most `attempts` times.
pub async fn wait_until_healthy(
    http: &HttpClient,
    url: &str,
    interval: Duration,
    attempts: u32,
) -> bool {
    for attempt in 1..=attempts {
        if probe_health(http, url).await {
            tracing::debug!(url, attempt, "server healthy");
            return true;
        }
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }
    false
}

/// Kill a launched server and reap it.
pub async fn stop_server(name: &str, child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::debug!(server = name, error = %e, "kill failed (already exited?)");
    }
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await.is_err() {
        tracing::warn!(server = name, "server did not exit after kill");
    }
}

/// Whether a launched process is still running.
pub fn is_running(child: &mut Child) -> bool {
    matches!(child.try_wait(), Ok(None))
}

async fn forward_output<R: AsyncRead + Unpin>(server: String, stream: R) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(server = %server, output = %line, "capability server output");
    }
}
