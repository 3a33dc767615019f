use std::io::IsTerminal;

use tracing::warn;
use tracing_subscriber::{
    self,
    filter::{EnvFilter, LevelFilter},
    prelude::*,
    Layer,
};

const SYSLOG_IDENTIFIER: &str = "ota-update-agent";

fn env_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy()
}

fn try_init_journal() -> eyre::Result<()> {
    let journal = tracing_journald::layer()?
        .with_syslog_identifier(SYSLOG_IDENTIFIER.to_owned())
        .with_filter(env_filter());
    tracing_subscriber::registry().with(journal).try_init()?;
    Ok(())
}

fn try_init_stdout_logger() -> eyre::Result<()> {
    let stdout_log = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stdout)
        .with_filter(env_filter());
    let stderr_log = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(
            stderr_log
                .with_filter(LevelFilter::WARN)
                .and_then(stdout_log),
        )
        .try_init()?;

    Ok(())
}

/// Log to journald when running as a service, to stdout/stderr when attached
/// to a terminal.
pub fn init() {
    let mut err: Option<eyre::Error> = None;
    let istty = std::io::stdin().is_terminal();
    if !istty {
        err = try_init_journal().err();
    }

    if istty || err.is_some() {
        err = try_init_stdout_logger().err();
    }

    if let Some(e) = err {
        warn!("failed to initialize journald logger: {}", e);
    }
}
