//! Modreg CLI - restore and publish modules stored in OCI registries.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "modreg=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Ctrl-C aborts in-flight registry requests
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let code = match cli.command {
        Commands::Publish(args) => commands::publish::run(&args, &cancel).await?,
        Commands::Restore(args) => commands::restore::run(&args, &cancel).await?,
        Commands::Version => {
            println!("modreg {}", env!("CARGO_PKG_VERSION"));
            0
        }
    };

    Ok(ExitCode::from(code))
}
