// Keywarden: Configuration
//
// Every setting is a global CLI flag with an environment fallback. `main`
// loads a `.env` file (if present) before parsing, so the same variables
// work from a shell, a unit file or a container environment.
//
// Secret-bearing values are never echoed by `--help`.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::error::{KeywardenError, Result};
use crate::lifecycle::LifecyclePolicy;
use crate::scheduler::SchedulerConfig;

pub const DEFAULT_REMOTE_URL: &str = "http://playground-service:8000";

#[derive(Args, Clone)]
pub struct Settings {
    /// Path to the key database.
    #[arg(long, env = "KEYWARDEN_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Secret the private-key encryption key is derived from (32+ bytes).
    #[arg(long, env = "KEYWARDEN_ENC_KEY", hide_env_values = true, global = true)]
    pub enc_key: Option<String>,

    /// HMAC secret shared with the remote execution environment.
    #[arg(
        long,
        env = "KEYWARDEN_SHARED_SECRET",
        hide_env_values = true,
        global = true
    )]
    pub shared_secret: Option<String>,

    /// Base URL of the remote execution environment.
    #[arg(long, env = "KEYWARDEN_REMOTE_URL", default_value = DEFAULT_REMOTE_URL, global = true)]
    pub remote_url: String,

    /// Rotate the active key once it is this many days old.
    #[arg(long, env = "KEYWARDEN_ROTATION_DAYS", default_value_t = 30, global = true)]
    pub rotation_days: u32,

    /// Hours between scheduled rotation checks.
    #[arg(
        long,
        env = "KEYWARDEN_ROTATION_CHECK_HOURS",
        default_value_t = 6,
        global = true
    )]
    pub rotation_check_hours: u64,

    /// Seconds between watchdog checks.
    #[arg(long, env = "KEYWARDEN_WATCHDOG_SECS", default_value_t = 300, global = true)]
    pub watchdog_secs: u64,

    /// Inactive keys kept after each rotation.
    #[arg(long, env = "KEYWARDEN_RETAIN_INACTIVE", default_value_t = 3, global = true)]
    pub retain_inactive: usize,

    /// Timeout for each request to the remote environment, in seconds.
    #[arg(
        long,
        env = "KEYWARDEN_REQUEST_TIMEOUT_SECS",
        default_value_t = 10,
        global = true
    )]
    pub request_timeout_secs: u64,

    /// Path of the daemon's control socket.
    #[arg(long, env = "KEYWARDEN_SOCKET", global = true)]
    pub socket: Option<PathBuf>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Settings")
            .field("db", &self.db)
            .field("enc_key", &redact(&self.enc_key))
            .field("shared_secret", &redact(&self.shared_secret))
            .field("remote_url", &self.remote_url)
            .field("rotation_days", &self.rotation_days)
            .field("rotation_check_hours", &self.rotation_check_hours)
            .field("watchdog_secs", &self.watchdog_secs)
            .field("retain_inactive", &self.retain_inactive)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("socket", &self.socket)
            .finish()
    }
}

impl Settings {
    /// Reject settings that would make the scheduler or client misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.rotation_check_hours == 0 {
            return Err(KeywardenError::Config(
                "rotation check interval must be at least 1 hour".to_string(),
            ));
        }
        if self.watchdog_secs == 0 {
            return Err(KeywardenError::Config(
                "watchdog interval must be at least 1 second".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(KeywardenError::Config(
                "request timeout must be at least 1 second".to_string(),
            ));
        }
        if !(self.remote_url.starts_with("http://") || self.remote_url.starts_with("https://")) {
            return Err(KeywardenError::Config(format!(
                "remote URL must be http(s): {}",
                self.remote_url
            )));
        }
        if self.watchdog_interval() >= self.rotation_interval() {
            tracing::warn!(
                watchdog_secs = self.watchdog_secs,
                rotation_check_hours = self.rotation_check_hours,
                "Watchdog interval is not shorter than the rotation interval"
            );
        }
        Ok(())
    }

    /// Directory holding the database and other state.
    pub fn data_dir() -> PathBuf {
        dirs_next::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("keywarden")
    }

    pub fn db_path(&self) -> PathBuf {
        self.db
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("keywarden.db"))
    }

    /// Control socket: `--socket`, else `$XDG_RUNTIME_DIR/keywarden/keywarden.sock`,
    /// else under `/tmp`.
    pub fn socket_path(&self) -> PathBuf {
        if let Some(path) = &self.socket {
            return path.clone();
        }
        let runtime_dir = dirs_next::runtime_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        runtime_dir.join("keywarden").join("keywarden.sock")
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_check_hours * 3600)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn lifecycle_policy(&self) -> LifecyclePolicy {
        LifecyclePolicy {
            retain_inactive: self.retain_inactive,
            ..LifecyclePolicy::default()
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            rotation_interval: self.rotation_interval(),
            watchdog_interval: self.watchdog_interval(),
            max_key_age_days: self.rotation_days,
            ..SchedulerConfig::default()
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        settings: Settings,
    }

    fn parse(args: &[&str]) -> Settings {
        let mut argv = vec!["keywarden"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().settings
    }

    #[test]
    fn test_defaults() {
        let s = parse(&[]);
        assert_eq!(s.remote_url, DEFAULT_REMOTE_URL);
        assert_eq!(s.rotation_days, 30);
        assert_eq!(s.rotation_interval(), Duration::from_secs(6 * 3600));
        assert_eq!(s.watchdog_interval(), Duration::from_secs(300));
        assert_eq!(s.lifecycle_policy().retain_inactive, 3);
        assert_eq!(s.request_timeout(), Duration::from_secs(10));
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_flags_override_defaults() {
        let s = parse(&[
            "--rotation-days",
            "7",
            "--watchdog-secs",
            "30",
            "--retain-inactive",
            "1",
            "--db",
            "/var/lib/keywarden/keys.db",
            "--socket",
            "/run/kw.sock",
        ]);
        let sched = s.scheduler_config();
        assert_eq!(sched.max_key_age_days, 7);
        assert_eq!(sched.watchdog_interval, Duration::from_secs(30));
        assert_eq!(s.lifecycle_policy().retain_inactive, 1);
        assert_eq!(s.db_path(), PathBuf::from("/var/lib/keywarden/keys.db"));
        assert_eq!(s.socket_path(), PathBuf::from("/run/kw.sock"));
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let s = parse(&["--watchdog-secs", "0"]);
        assert!(matches!(s.validate(), Err(KeywardenError::Config(_))));

        let s = parse(&["--rotation-check-hours", "0"]);
        assert!(matches!(s.validate(), Err(KeywardenError::Config(_))));
    }

    #[test]
    fn test_non_http_remote_rejected() {
        let s = parse(&["--remote-url", "ftp://playground"]);
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_default_paths() {
        let s = parse(&[]);
        assert!(s.db_path().ends_with("keywarden/keywarden.db"));
        assert!(s.socket_path().ends_with("keywarden/keywarden.sock"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let s = parse(&["--enc-key", "super-secret-value", "--shared-secret", "hmac-value"]);
        let debug = format!("{:?}", s);
        assert!(!debug.contains("super-secret-value"));
        assert!(!debug.contains("hmac-value"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_help_names_secret_env_vars() {
        use clap::CommandFactory;
        let help = TestCli::command().render_help().to_string();
        assert!(help.contains("KEYWARDEN_ENC_KEY"));
        assert!(help.contains("KEYWARDEN_SHARED_SECRET"));
    }
}
