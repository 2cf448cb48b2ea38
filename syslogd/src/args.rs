//! CLI argument parsing.

use std::path::PathBuf;

use clap::Parser;

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "syslogd.json5";

/// Command line arguments for the daemon.
#[derive(Parser, Debug, Clone)]
#[command(about = "Syslog receiver for UDP, TCP and Unix sockets", version)]
pub struct Args {
    /// Path to configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Args {
    /// Parse process arguments, exiting with usage on error.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default_config() {
        let args = Args::try_parse_from(["syslogd"]).unwrap();
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(args.log_level.is_none());
    }

    #[test]
    fn test_args_overrides() {
        let args =
            Args::try_parse_from(["syslogd", "-c", "/etc/syslogd.json5", "--log-level", "debug"])
                .unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/syslogd.json5"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_args_reject_unknown() {
        assert!(Args::try_parse_from(["syslogd", "--bogus"]).is_err());
    }
}
