// Keywarden: CLI Command Handlers
//
// Each function handles one CLI subcommand. One-shot commands build a
// lifecycle service over the on-disk database, run a single operation and
// exit. `serve` keeps the service alive under the scheduler and exposes it
// on the control socket until Ctrl-C.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::config::Settings;
use crate::crypto::{KeyCodec, SecretCipher};
use crate::distributor::{Distributor, HttpRemoteEnvironment};
use crate::error::{KeywardenError, Result};
use crate::gateway::{self, ControlServer};
use crate::lifecycle::{KeyLifecycle, RotationOutcome, WatchdogOutcome};
use crate::scheduler::Scheduler;
use crate::store::{Database, SqliteKeyStore};

use super::{Cli, Commands};

/// Execute the parsed CLI command.
pub async fn execute(cli: Cli) -> Result<()> {
    let Cli { settings, command } = cli;

    match command {
        Commands::Init => cmd_init(&settings),
        Commands::Call { method, params } => cmd_call(&settings, &method, params).await,
        Commands::Serve => cmd_serve(&settings).await,
        command => {
            let lifecycle = open_lifecycle(&settings)?;
            run_one_shot(&settings, &lifecycle, command).await
        }
    }
}

async fn run_one_shot(settings: &Settings, lifecycle: &KeyLifecycle, command: Commands) -> Result<()> {
    match command {
        Commands::Generate => {
            let generated = lifecycle.generate_and_persist().await?;
            println!("✓ Key generated (pending)");
            println!("  Fingerprint: {}", generated.fingerprint());
            println!("  Public key:  {}", generated.public_key());
            println!();
            println!("Next: keywarden activate {}", generated.fingerprint());
        }
        Commands::Activate { fingerprint } => {
            let report = lifecycle.activate_and_distribute(&fingerprint).await?;
            println!("✓ Key {} is now active", report.key.fingerprint);
            if let Some(demoted) = &report.demoted {
                println!("  Deprecated:  {}", demoted);
            }
            match &report.distribution_error {
                None => println!("  Distributed to remote environment"),
                Some(e) => println!("  Distribution failed: {} (the watchdog will retry)", e),
            }
        }
        Commands::Revoke { fingerprint } => {
            let summary = lifecycle.revoke_key(&fingerprint).await?;
            println!("✓ Key {} revoked", summary.fingerprint);
        }
        Commands::Redistribute { fingerprint } => {
            let redistribution = match fingerprint {
                Some(fp) => lifecycle.redistribute_fingerprint(&fp).await?,
                None => lifecycle.redistribute_active_key().await?,
            };
            println!("✓ Key {} redistributed", redistribution.fingerprint);
            print_json(&redistribution.remote)?;
        }
        Commands::Rotate { max_age_days } => {
            let days = max_age_days.unwrap_or(settings.rotation_days);
            match lifecycle.rotate_if_due(days).await? {
                RotationOutcome::NoActiveKey => println!("No active key; nothing to rotate."),
                RotationOutcome::NotDue {
                    fingerprint,
                    age_seconds,
                    threshold_seconds,
                } => println!(
                    "Key {} is not due ({}s old, threshold {}s)",
                    fingerprint, age_seconds, threshold_seconds
                ),
                RotationOutcome::Rotated {
                    previous,
                    current,
                    distributed,
                    purged,
                } => {
                    println!("✓ Rotated {} -> {}", previous, current);
                    println!("  Distributed: {}", distributed);
                    if !purged.is_empty() {
                        println!("  Purged:      {}", purged.join(", "));
                    }
                }
            }
        }
        Commands::Watchdog => match lifecycle.watchdog_check().await {
            WatchdogOutcome::Healthy => println!("✓ Remote environment has a key installed"),
            WatchdogOutcome::NoActiveKey => println!("No active key to install."),
            WatchdogOutcome::Redistributed { fingerprint } => {
                println!("✓ Remote was missing its key; redistributed {}", fingerprint)
            }
            WatchdogOutcome::Error { error } => {
                return Err(KeywardenError::Other(format!("Watchdog check failed: {}", error)))
            }
        },
        Commands::TestConnection => {
            let result = lifecycle.test_connectivity().await?;
            println!("✓ Remote connection test succeeded");
            print_json(&result)?;
        }
        Commands::Setup => {
            let report = lifecycle.provision().await?;
            for step in &report.steps {
                println!("✓ Step {}: {}", step.step, step.action);
            }
            println!();
            println!("Setup complete. Active key: {}", report.fingerprint);
            println!("Add this public key to your VCS provider:");
            println!("  {}", report.public_key);
        }
        Commands::Active => match lifecycle.active_key()? {
            Some(key) => print_json(&key)?,
            None => println!("No active key. Run `keywarden setup` to create one."),
        },
        Commands::List => {
            let keys = lifecycle.list_keys()?;
            if keys.is_empty() {
                println!("No keys stored yet.");
                return Ok(());
            }
            println!("Keys ({}):\n", keys.len());
            for key in &keys {
                println!(
                    "  {} │ {:10} │ {}",
                    key.fingerprint,
                    key.status,
                    key.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                );
            }
        }
        Commands::Audit { fingerprint } => {
            let events = lifecycle.audit_log(&fingerprint)?;
            if events.is_empty() {
                println!("No audit events for {}", fingerprint);
                return Ok(());
            }
            println!("Audit log for {}", fingerprint);
            println!("{:-<80}", "");
            for event in events {
                println!("{}", event);
            }
            println!("{:-<80}", "");
        }
        Commands::Init | Commands::Serve | Commands::Call { .. } => {}
    }

    Ok(())
}

// ─── Init ────────────────────────────────────────────────────────────────────

fn cmd_init(settings: &Settings) -> Result<()> {
    let path = settings.db_path();
    open_database(&path)?;

    println!("✓ Keywarden initialized");
    println!("  Database: {}", path.display());
    if settings.enc_key.as_deref().is_none_or(str::is_empty) {
        println!("  Warning:  KEYWARDEN_ENC_KEY is not set; key generation will fail");
    }
    if settings.shared_secret.as_deref().is_none_or(str::is_empty) {
        println!("  Warning:  KEYWARDEN_SHARED_SECRET is not set; distribution will fail");
    }
    println!();
    println!("Next: keywarden setup");

    Ok(())
}

// ─── Serve ───────────────────────────────────────────────────────────────────

async fn cmd_serve(settings: &Settings) -> Result<()> {
    let lifecycle = Arc::new(open_lifecycle(settings)?);
    let scheduler = Scheduler::start(lifecycle.clone(), settings.scheduler_config());

    let socket_path = settings.socket_path();
    let server = ControlServer::new(lifecycle, socket_path.clone(), settings.rotation_days);
    let (stop_tx, stop_rx) = watch::channel(false);

    println!("Keywarden daemon running; control socket at {}", socket_path.display());

    let served = tokio::select! {
        result = server.run(stop_rx) => result,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
            tracing::info!("Shutdown requested");
            let _ = stop_tx.send(true);
            Ok(())
        }
    };

    scheduler.stop().await;
    if socket_path.exists() {
        if let Err(e) = std::fs::remove_file(&socket_path) {
            tracing::warn!(error = %e, "Failed to remove control socket");
        }
    }
    served
}

// ─── Call ────────────────────────────────────────────────────────────────────

async fn cmd_call(settings: &Settings, method: &str, params: Option<String>) -> Result<()> {
    let params = match params {
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|e| KeywardenError::Other(format!("Params must be JSON: {}", e)))?,
        None => Value::Null,
    };

    let result = gateway::call(&settings.socket_path(), method, params).await?;
    match result {
        Value::String(text) => println!("{}", text),
        other => print_json(&other)?,
    }
    Ok(())
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text =
        serde_json::to_string_pretty(value).map_err(|e| KeywardenError::Other(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

fn open_database(path: &Path) -> Result<Database> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Database::open(path).map_err(|e| {
        KeywardenError::Other(format!("Failed to open database {}: {}", path.display(), e))
    })
}

/// Wire the lifecycle service to the on-disk store and the HTTP remote.
fn open_lifecycle(settings: &Settings) -> Result<KeyLifecycle> {
    let db = open_database(&settings.db_path())?;
    let store = Arc::new(SqliteKeyStore::new(db));
    let remote = Arc::new(HttpRemoteEnvironment::new(
        &settings.remote_url,
        settings.request_timeout(),
    )?);
    let distributor = Distributor::new(remote, settings.shared_secret.as_deref());
    let cipher = SecretCipher::new(settings.enc_key.as_deref());

    Ok(KeyLifecycle::new(
        store,
        KeyCodec::new(),
        cipher,
        distributor,
        settings.lifecycle_policy(),
    ))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(dir: &Path, args: &[&str]) -> Cli {
        let db = dir.join("nested").join("keys.db");
        let mut argv = vec![
            "keywarden".to_string(),
            "--db".to_string(),
            db.display().to_string(),
            "--enc-key".to_string(),
            "cli-test-encryption-secret-0123456789abcdef".to_string(),
            "--shared-secret".to_string(),
            "cli-test-shared".to_string(),
            "--remote-url".to_string(),
            "http://127.0.0.1:9".to_string(),
        ];
        argv.extend(args.iter().map(|a| a.to_string()));
        Cli::try_parse_from(argv).unwrap()
    }

    #[tokio::test]
    async fn test_init_creates_database_in_nested_dir() {
        let dir = tempfile::tempdir().unwrap();
        execute(cli(dir.path(), &["init"])).await.unwrap();
        assert!(dir.path().join("nested").join("keys.db").exists());
    }

    #[tokio::test]
    async fn test_one_shot_commands_share_the_database() {
        let dir = tempfile::tempdir().unwrap();
        execute(cli(dir.path(), &["generate"])).await.unwrap();

        let settings = cli(dir.path(), &["list"]).settings;
        let keys = open_lifecycle(&settings).unwrap().list_keys().unwrap();
        assert_eq!(keys.len(), 1);

        // Activation succeeds even though the remote is unreachable.
        execute(cli(dir.path(), &["activate", &keys[0].fingerprint]))
            .await
            .unwrap();
        let active = open_lifecycle(&settings).unwrap().active_key().unwrap();
        assert_eq!(active.unwrap().fingerprint, keys[0].fingerprint);
    }

    #[tokio::test]
    async fn test_unknown_fingerprint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = execute(cli(dir.path(), &["revoke", "SHA256:missing"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("SHA256:missing"));
    }

    #[tokio::test]
    async fn test_call_rejects_non_json_params() {
        let dir = tempfile::tempdir().unwrap();
        let err = execute(cli(dir.path(), &["call", "audit", "not-json"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Params must be JSON"));
    }
}
