use std::time::Duration;

use clap::Args;
use shmrpc_codec::Protocol;
use shmrpc_peer::Config;

use crate::logging::{init_logging, LogFormat, LogLevel};

/// Flags shared by the demo programs.
#[derive(Args, Debug, Clone)]
pub struct DemoArgs {
    /// Endpoint name to serve and connect to.
    #[arg(long, default_value = "svc")]
    pub name: String,

    /// Wire protocol (compact, fast or simple).
    #[arg(long, default_value = "compact")]
    pub protocol: Protocol,

    /// Send payloads without the protocol header.
    #[arg(long)]
    pub no_marshal: bool,

    /// Reference pooled byte ranges at least this long instead of copying them.
    #[arg(long, value_name = "BYTES", default_value_t = 0)]
    pub min_blob_size: usize,

    /// Request timeout in milliseconds. Omit to wait indefinitely.
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    pub log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: LogLevel,
}

impl DemoArgs {
    pub fn init_logging(&self) {
        init_logging(self.log_format, self.log_level);
    }

    pub fn config(&self) -> Config {
        Config {
            protocol: self.protocol,
            marshal: !self.no_marshal,
            min_blob_size: self.min_blob_size,
            default_request_timeout: self.timeout_ms.map(Duration::from_millis),
            ..Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser, Debug)]
    struct Cli {
        #[command(flatten)]
        demo: DemoArgs,
    }

    #[test]
    fn defaults_match_config_defaults() {
        let cli = Cli::try_parse_from(["demo"]).expect("no args should parse");
        let config = cli.demo.config();

        assert_eq!(cli.demo.name, "svc");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn parses_protocol_and_limits() {
        let cli = Cli::try_parse_from([
            "demo",
            "--protocol",
            "simple",
            "--no-marshal",
            "--min-blob-size",
            "256",
            "--timeout-ms",
            "750",
            "--log-format",
            "json",
        ])
        .expect("flags should parse");
        let config = cli.demo.config();

        assert_eq!(config.protocol, Protocol::SimpleBinary);
        assert!(!config.marshal);
        assert_eq!(config.min_blob_size, 256);
        assert_eq!(config.default_request_timeout, Some(Duration::from_millis(750)));
        assert!(matches!(cli.demo.log_format, LogFormat::Json));
    }

    #[test]
    fn rejects_unknown_protocol() {
        let err = Cli::try_parse_from(["demo", "--protocol", "xml"]).expect_err("xml is not a protocol");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
