//! Logging setup for the command-line front end.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use clap::ValueEnum;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Picks the filter directive: `RUST_LOG` wins, then `--log-level`, then
/// `info`. `--quiet` raises the default to `warn`.
fn directive(level: Option<LogLevel>, quiet: bool, env: Option<String>) -> String {
    if let Some(env) = env.filter(|v| !v.trim().is_empty()) {
        return env;
    }
    match (level, quiet) {
        (Some(level), false) => level.as_directive().to_string(),
        (Some(LogLevel::Error), true) => "error".to_string(),
        (_, true) => "warn".to_string(),
        (None, false) => "info".to_string(),
    }
}

/// Installs the global subscriber: stderr, plus `log_file` when given.
pub fn init(level: Option<LogLevel>, quiet: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let directive = directive(level, quiet, std::env::var(EnvFilter::DEFAULT_ENV).ok());

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::try_new(&directive).context("invalid log filter")?);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            // The file always records at least info, even when the console is quiet.
            let file_directive = if quiet && level.is_none() {
                "info"
            } else {
                directive.as_str()
            };
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_filter(EnvFilter::try_new(file_directive).context("invalid log filter")?),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .context("failed to install logger")?;
    Ok(())
}
