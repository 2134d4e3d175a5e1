//! Publish command implementation.
//!
//! Compiles a module file and publishes it to an OCI-compatible registry.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use modreg_core::{FailureDetail, ModuleCompiler, SourceCompiler};
use modreg_registry::{DispatchError, ModuleDispatcher};

use super::options::RegistryOptions;

/// Arguments for the publish command.
#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Path to the module file to publish
    #[arg(required = true)]
    pub file: PathBuf,

    /// Target module reference (e.g. `br:myregistry.azurecr.io/modules/storage:v1`)
    #[arg(short, long)]
    pub target: String,

    #[command(flatten)]
    pub registry: RegistryOptions,
}

/// Runs the publish command and returns the process exit code.
///
/// The target reference and the registry's publish capability are checked
/// before the module is compiled.
///
/// # Errors
///
/// Returns an error if:
/// - The target reference is invalid
/// - The target registry does not support publishing
/// - The upload fails
pub async fn run(args: &PublishArgs, cancel: &CancellationToken) -> Result<u8> {
    let config = args.registry.config()?;
    let entry_point = config.entry_point.clone();
    let dispatcher =
        ModuleDispatcher::from_config(config).context("Failed to create registry client")?;

    let reference = dispatcher
        .try_get_module_reference(&args.target)
        .map_err(DispatchError::InvalidReference)?;

    if !dispatcher.registry_capabilities(&reference).can_publish() {
        anyhow::bail!(DispatchError::NotPublishable(
            FailureDetail::module_not_publishable(&reference.to_string())
        ));
    }

    info!(file = %args.file.display(), target = %reference, "Publishing module");

    let compilation = SourceCompiler.compile(&args.file);
    for error in &compilation.errors {
        eprintln!("error: {error}");
    }
    if !compilation.is_success() {
        return Ok(1);
    }

    // Stage the compiled module as the artifact's entry point
    let staging = tempfile::tempdir().context("Failed to create staging directory")?;
    std::fs::write(staging.path().join(&entry_point), &compilation.output)
        .context("Failed to stage compiled module")?;

    let outcome = dispatcher
        .publish_module(&reference, staging.path(), cancel)
        .await
        .context("Failed to publish module")?;

    println!("Module published successfully!");
    println!();
    println!("  Reference: {}", outcome.reference);
    println!("  Digest:    {}", outcome.manifest_digest);
    println!("  Layers:    {}", outcome.layers);

    Ok(0)
}
