// Keywarden: Application Entry Point
//
// Loads `.env`, initializes structured logging (the default filter never
// emits key material), parses the CLI and dispatches to the command handler.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use keywarden::cli::{execute, Cli};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // RUST_LOG=keywarden=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("keywarden=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Err(e) = cli.settings.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(2);
    }

    if let Err(e) = execute(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
