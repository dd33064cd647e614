pub mod config;
pub mod dispatcher;
pub mod gateway;
pub mod orchestrator;
pub mod registry;
pub mod uploads;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

pub use config::AppConfig;
pub use orchestrator::{Orchestrator, TurnRequest, TurnResponse};

/// Log files kept besides the live one.
const KEEP_LOGS: u32 = 3;

/// Return the platform-standard data directory for Toolweave.
///
/// - macOS: `~/Library/Application Support/toolweave/`
/// - Linux: `$XDG_DATA_HOME/toolweave/` (fallback `~/.local/share/toolweave/`)
///
/// Falls back to `~/.toolweave/` when neither resolves.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("toolweave");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".toolweave")
}

/// Initialize the tracing subscriber.
///
/// Logs go to `toolweave.log` in the data directory (rotated on startup,
/// last three kept), or to stderr when `to_stderr` is set. The filter comes
/// from `RUST_LOG`; `TOOLWEAVE_LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing(to_stderr: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("toolweave=info,warn"));
    let json = std::env::var("TOOLWEAVE_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let log_dir = data_dir();
    let log_path = log_dir.join("toolweave.log");
    let writer = if to_stderr {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        // `File` is unbuffered, so each event reaches disk as it is written.
        BoxMakeWriter::new(Mutex::new(open_log_file(&log_path)?))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    let log_target = if to_stderr {
        "stderr".to_string()
    } else {
        log_path.display().to_string()
    };
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %log_dir.display(),
        log_file = %log_target,
        pid = std::process::id(),
        "=== Toolweave starting ==="
    );
    Ok(())
}

/// Rotate the previous run's log and open a fresh one, creating the
/// directory if needed.
fn open_log_file(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    rotate_log_file(path, KEEP_LOGS);
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}

/// `toolweave.log` with generation `n` appended, e.g. `toolweave.log.2`.
fn log_generation(base: &Path, n: u32) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

/// Move each log one generation older; whatever sat at `.{keep}` is replaced.
/// Rotation is best-effort: a failed rename only costs old logs.
fn rotate_log_file(base: &Path, keep: u32) {
    for n in (1..=keep).rev() {
        let older = if n == 1 {
            base.to_path_buf()
        } else {
            log_generation(base, n - 1)
        };
        if older.exists() {
            let _ = std::fs::rename(&older, log_generation(base, n));
        }
    }
}
