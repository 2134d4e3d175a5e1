//! # Modreg Registry
//!
//! Restores and publishes modules stored as artifacts in OCI-compatible
//! registries.
//!
//! ## Features
//!
//! - **OCI Distribution API**: tag resolution, manifest and blob transfer,
//!   chunkless blob upload
//! - **Content addressing**: every downloaded manifest and blob is verified
//!   against its SHA-256 digest
//! - **Local cache**: deterministic per-reference directories, atomic file
//!   writes, one restore per directory at a time
//! - **Dispatch**: scheme-keyed registries with capability checks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modreg_registry::{ModuleDispatcher, RegistryConfig, RegistryAuth};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RegistryConfig::new("/tmp/artifacts")
//!         .with_auth(RegistryAuth::bearer("token"));
//!     let dispatcher = ModuleDispatcher::from_config(config)?;
//!
//!     let reference = dispatcher
//!         .try_get_module_reference("br:myregistry.azurecr.io/bicep/modules/storage:v1")
//!         .map_err(|failure| failure.to_string())?;
//!
//!     let restored = dispatcher
//!         .restore_modules(&[reference], &CancellationToken::new())
//!         .await;
//!     assert!(restored);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ModuleDispatcher                         │
//! │        ""  → LocalModuleRegistry                            │
//! │        br  → OciModuleRegistry                              │
//! └─────────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    RegistryClient                           │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │   OciApi    │  │   Cache     │  │   Manifest codec    │  │
//! │  │  (HTTP)     │  │  (File)     │  │   (JSON)            │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  OCI Registry                               │
//! │     (Docker Registry, Harbor, ACR, ECR, GCR, etc.)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod cache;
mod client;
mod config;
mod dispatcher;
mod error;
pub mod oci;
mod registry;
mod stream;
mod timer;

pub use cache::{ArtifactCache, CacheLayout};
pub use client::{FailureReason, OciArtifactClient, PushResult, RegistryClient, RestoreStatus};
pub use config::{CredentialProvider, RegistryAuth, RegistryConfig, TlsConfig, DEFAULT_ENTRY_POINT};
pub use dispatcher::{DispatchError, ModuleDispatcher, ModuleRestoreStatus};
pub use error::RegistryError;
pub use oci::{Descriptor, DigestAlgorithm, Manifest, MediaType};
pub use registry::{
    LocalModuleRegistry, ModuleConfig, ModuleRegistry, OciModuleRegistry, PublishOutcome,
    RegistryCapabilities, RestoreFailures,
};
pub use stream::{BlobSource, StreamDescriptor};
pub use timer::ExecutionTimer;
