//! Restore command implementation.
//!
//! Downloads referenced modules into the local cache.

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use modreg_registry::{ModuleDispatcher, ModuleRestoreStatus};

use super::options::RegistryOptions;

/// Arguments for the restore command.
#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Module references to restore (e.g. `br:myregistry.azurecr.io/modules/storage:v1`)
    #[arg(required = true)]
    pub references: Vec<String>,

    /// Restore even if the module is already cached
    #[arg(long)]
    pub force: bool,

    #[command(flatten)]
    pub registry: RegistryOptions,
}

/// Runs the restore command and returns the process exit code.
///
/// Every reference is attempted; the exit code is 1 if any of them is
/// invalid or fails to restore.
///
/// # Errors
///
/// Returns an error if the registry client cannot be created.
pub async fn run(args: &RestoreArgs, cancel: &CancellationToken) -> Result<u8> {
    let config = args.registry.config()?;
    let dispatcher =
        ModuleDispatcher::from_config(config).context("Failed to create registry client")?;

    let mut failed = 0usize;
    let mut references = Vec::with_capacity(args.references.len());
    for text in &args.references {
        match dispatcher.try_get_module_reference(text) {
            Ok(reference) => references.push(reference),
            Err(failure) => {
                eprintln!("error {failure}");
                failed += 1;
            }
        }
    }

    if !args.force {
        references.retain(|reference| {
            let status = dispatcher.get_module_restore_status(reference);
            if status == ModuleRestoreStatus::NotRequired {
                println!("  {reference} (cached)");
            }
            status != ModuleRestoreStatus::NotRequired
        });
    }

    info!(count = references.len(), "Restoring modules");
    let failures = dispatcher.restore_failures(&references, cancel).await;

    for reference in &references {
        match failures.get(reference) {
            Some(failure) => eprintln!("error {failure}"),
            None => println!("  {reference} restored"),
        }
    }
    failed += failures.len();

    if failed > 0 {
        eprintln!();
        eprintln!("{failed} module(s) could not be restored.");
        return Ok(1);
    }

    Ok(0)
}
