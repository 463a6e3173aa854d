//! Logging arguments and subscriber setup.

use clap::Args;
use eyre::Result;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Logging configuration.
#[derive(Debug, Args, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[command(next_help_heading = "Logging")]
#[serde(default)]
pub struct LogArgs {
    /// Silence all output.
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbose mode (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    #[serde(skip)]
    pub verbosity: u8,

    /// Log filter directive (e.g., "tether_manager=debug,tether_connection=trace").
    #[arg(long = "log.filter", value_name = "DIRECTIVE")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// Use JSON format for log output.
    #[arg(long = "log.json")]
    pub json: bool,
}

impl LogArgs {
    /// Builds the filter.
    ///
    /// `--quiet` shows errors only. Otherwise `RUST_LOG` wins over the verbosity level, and
    /// `--log.filter` directives are added on top. Unparseable directives are skipped.
    pub fn env_filter(&self) -> EnvFilter {
        if self.quiet {
            return EnvFilter::new("error");
        }

        let base_level = match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(base_level));

        if let Some(custom) = &self.filter {
            for directive in custom.split(',').filter(|d| !d.trim().is_empty()) {
                if let Ok(d) = directive.trim().parse() {
                    filter = filter.add_directive(d);
                }
            }
        }
        filter
    }
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_logging(args: &LogArgs) -> Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(args.env_filter());
    if args.json {
        builder
            .json()
            .try_init()
            .map_err(|e| eyre::eyre!("failed to initialise logging: {e}"))
    } else {
        builder
            .try_init()
            .map_err(|e| eyre::eyre!("failed to initialise logging: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        log: LogArgs,
    }

    #[test]
    fn test_parse_args() {
        let cli = Cli::parse_from(["tether", "-vv", "--log.filter", "tether_manager=trace", "--log.json"]);
        assert_eq!(cli.log.verbosity, 2);
        assert!(cli.log.json);
        assert_eq!(cli.log.filter.as_deref(), Some("tether_manager=trace"));
    }

    #[test]
    fn test_quiet_filter() {
        let args = LogArgs {
            quiet: true,
            ..Default::default()
        };
        assert_eq!(args.env_filter().to_string(), "error");
    }
}
