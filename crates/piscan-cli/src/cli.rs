use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "piscan", version)]
#[command(about = "Ticket scanning console for the PiScan validator", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Production logging: JSON to rolling files plus compact stderr
    #[arg(long, global = true)]
    pub production: bool,

    /// Log level (trace, debug, info, warn, error); overrides PISCAN_LOG_LEVEL
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Scan tickets; every input line is one decoded code
    ///
    /// A blank line or `:reset` readies the scanner for the next ticket,
    /// `:quit` (or end of input) ends the session.
    Scan {
        /// Ready the scanner again right after each result
        #[arg(long)]
        auto_reset: bool,
    },

    /// Show recently validated tickets
    History {
        /// Number of entries to fetch (defaults to display.history_limit)
        #[arg(short = 'n', long)]
        limit: Option<u32>,
    },

    /// Show aggregate validation counters
    Stats,

    /// Check that the validator is reachable
    Health,

    /// Print the effective configuration
    Config {
        /// Write a default configuration file instead
        #[arg(long)]
        init: bool,

        /// Overwrite an existing file with --init
        #[arg(long, requires = "init")]
        force: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "piscan",
            "scan",
            "--auto-reset",
            "--config",
            "/etc/piscan/config.toml",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.command, Command::Scan { auto_reset: true });
        assert_eq!(
            cli.config.as_deref(),
            Some(std::path::Path::new("/etc/piscan/config.toml"))
        );
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(!cli.production);
    }

    #[test]
    fn test_history_limit() {
        let cli = Cli::try_parse_from(["piscan", "history", "-n", "5"]).unwrap();
        assert_eq!(cli.command, Command::History { limit: Some(5) });
    }

    #[test]
    fn test_force_requires_init() {
        assert!(Cli::try_parse_from(["piscan", "config", "--force"]).is_err());
        let cli = Cli::try_parse_from(["piscan", "config", "--init", "--force"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Config {
                init: true,
                force: true
            }
        );
    }
}
