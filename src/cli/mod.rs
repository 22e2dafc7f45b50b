// Keywarden: CLI Module
//
// Command-line interface using clap derive macros. Every command except
// `serve` and `call` opens the key database directly and runs a single
// lifecycle operation. Settings are global flags with env fallbacks.

mod commands;

use clap::{Parser, Subcommand};

use crate::config::Settings;

pub use commands::execute;

/// Keywarden: SSH credential lifecycle manager.
#[derive(Parser, Debug)]
#[command(name = "keywarden")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the data directory and key database.
    Init,

    /// Generate a new key pair and store it as pending.
    Generate,

    /// Make a key the active key and push it to the remote environment.
    Activate {
        /// Fingerprint of the key (e.g. "SHA256:...").
        fingerprint: String,
    },

    /// Permanently revoke a key.
    Revoke {
        /// Fingerprint of the key to revoke.
        fingerprint: String,
    },

    /// Push the active key to the remote environment again.
    Redistribute {
        /// Only redistribute if this fingerprint is the active key.
        #[arg(long)]
        fingerprint: Option<String>,
    },

    /// Rotate the active key if it is older than the threshold.
    Rotate {
        /// Age threshold in days (defaults to --rotation-days).
        #[arg(long)]
        max_age_days: Option<u32>,
    },

    /// Run one watchdog check now.
    Watchdog,

    /// Redistribute the active key and run the remote connection test.
    TestConnection,

    /// Generate, activate, distribute and test a key in one step.
    Setup,

    /// Show the active key.
    Active,

    /// List all keys (metadata only, never private material).
    List,

    /// Show the audit trail for a key ("system" for watchdog errors).
    Audit {
        /// Fingerprint of the key.
        fingerprint: String,
    },

    /// Run the daemon: rotation and watchdog loops plus the control socket.
    Serve,

    /// Send one JSON-RPC request to a running daemon.
    Call {
        /// Method name (e.g. "metrics", "rotate_if_due").
        method: String,

        /// JSON object of parameters.
        params: Option<String>,
    },
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_subcommands_with_global_flags() {
        let cli = Cli::try_parse_from([
            "keywarden",
            "activate",
            "SHA256:abc",
            "--remote-url",
            "http://localhost:9000",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Activate { ref fingerprint } if fingerprint == "SHA256:abc"));
        assert_eq!(cli.settings.remote_url, "http://localhost:9000");
    }

    #[test]
    fn test_optional_arguments() {
        let cli = Cli::try_parse_from(["keywarden", "rotate", "--max-age-days", "0"]).unwrap();
        assert!(matches!(cli.command, Commands::Rotate { max_age_days: Some(0) }));

        let cli = Cli::try_parse_from(["keywarden", "call", "audit", r#"{"fingerprint":"x"}"#])
            .unwrap();
        assert!(matches!(cli.command, Commands::Call { params: Some(_), .. }));

        let cli = Cli::try_parse_from(["keywarden", "test-connection"]).unwrap();
        assert!(matches!(cli.command, Commands::TestConnection));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
