//! Subscriber setup for the demo programs.
//!
//! The memory and transport crates emit `tracing` events; nothing is printed
//! until a program installs a subscriber with [`init_logging`].

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Crates whose events the chosen level applies to. Everything else logs
/// warnings only.
const SHMRPC_TARGETS: [&str; 5] = [
    "shmrpc",
    "shmrpc_memory",
    "shmrpc_codec",
    "shmrpc_transport",
    "shmrpc_peer",
];

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Filter directives enabling `level` for the shmrpc crates.
pub fn directives(level: LogLevel) -> String {
    let level = LevelFilter::from(level);
    let mut directives = String::from("warn");
    for target in SHMRPC_TARGETS {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

/// Log to stderr in `format`.
///
/// `RUST_LOG`, when set, replaces the directives derived from `level`.
/// Returns false if a global subscriber was already installed.
pub fn init_logging(format: LogFormat, level: LogLevel) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives(level)));
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(false);

    match format {
        LogFormat::Text => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}
