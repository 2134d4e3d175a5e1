//! Scheme-based routing of module references to registries.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use modreg_core::reference::split_scheme;
use modreg_core::{FailureDetail, ModuleReference, ReferenceError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::registry::{
    LocalModuleRegistry, ModuleRegistry, OciModuleRegistry, PublishOutcome, RegistryCapabilities,
    RestoreFailures,
};

/// Errors raised by dispatcher operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The reference text is not valid.
    #[error("{}", .0.message)]
    InvalidReference(FailureDetail),

    /// No registry is registered for the reference's scheme.
    #[error("{}", .0.message)]
    UnknownScheme(FailureDetail),

    /// The target registry does not support publishing.
    #[error("{}", .0.message)]
    NotPublishable(FailureDetail),

    /// The registry operation failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Whether a module must be restored before it can be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleRestoreStatus {
    /// The module is available locally.
    NotRequired,

    /// The module must be restored.
    Required,

    /// The status could not be determined.
    Unknown(FailureDetail),
}

/// Entry point for all module operations.
///
/// Holds one registry per scheme and routes each reference to the registry
/// of its scheme.
#[derive(Debug, Clone, Default)]
pub struct ModuleDispatcher {
    registries: BTreeMap<&'static str, Arc<dyn ModuleRegistry>>,
}

impl ModuleDispatcher {
    /// Creates a dispatcher over the given registries.
    ///
    /// A later registry replaces an earlier one with the same scheme.
    #[must_use]
    pub fn new(registries: impl IntoIterator<Item = Arc<dyn ModuleRegistry>>) -> Self {
        Self {
            registries: registries
                .into_iter()
                .map(|registry| (registry.scheme(), registry))
                .collect(),
        }
    }

    /// Creates a dispatcher with the local registry and an OCI registry
    /// built from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_config(config: RegistryConfig) -> Result<Self, RegistryError> {
        let oci = OciModuleRegistry::from_config(config)?;
        Ok(Self::new([
            Arc::new(LocalModuleRegistry::new()) as Arc<dyn ModuleRegistry>,
            Arc::new(oci),
        ]))
    }

    /// Returns the registered schemes in order.
    #[must_use]
    pub fn available_schemes(&self) -> Vec<&'static str> {
        self.registries.keys().copied().collect()
    }

    /// Parses reference text with the registry of its scheme.
    ///
    /// # Errors
    ///
    /// Returns a failure detail if the scheme is not registered or the
    /// reference is invalid.
    pub fn try_get_module_reference(&self, text: &str) -> Result<ModuleReference, FailureDetail> {
        if text.is_empty() {
            return Err(ReferenceError::Empty.into());
        }

        let (scheme, raw) = split_scheme(text);
        let registry = self
            .registries
            .get(scheme)
            .ok_or_else(|| self.unknown_scheme(scheme))?;

        registry.try_parse_module_reference(raw)
    }

    /// Returns whether `reference` must be restored.
    #[must_use]
    pub fn get_module_restore_status(&self, reference: &ModuleReference) -> ModuleRestoreStatus {
        match self.registry(reference) {
            Ok(registry) if registry.is_module_restore_required(reference) => {
                ModuleRestoreStatus::Required
            }
            Ok(_) => ModuleRestoreStatus::NotRequired,
            Err(failure) => ModuleRestoreStatus::Unknown(failure),
        }
    }

    /// Returns the local path of the module's entry point.
    ///
    /// `parent` is the path of the module that declared the reference.
    ///
    /// # Errors
    ///
    /// Returns a failure detail if the scheme is not registered or the
    /// registry cannot locate the module.
    pub fn try_get_local_module_entry_point(
        &self,
        parent: &Path,
        reference: &ModuleReference,
    ) -> Result<PathBuf, FailureDetail> {
        self.registry(reference)?
            .try_get_local_module_entry_point_path(parent, reference)
    }

    /// Restores `references` and returns true if all of them succeeded.
    pub async fn restore_modules(
        &self,
        references: &[ModuleReference],
        cancel: &CancellationToken,
    ) -> bool {
        self.restore_failures(references, cancel).await.is_empty()
    }

    /// Restores `references` and returns the ones that failed.
    ///
    /// References are grouped by scheme; a failing reference does not stop
    /// the others from being restored.
    pub async fn restore_failures(
        &self,
        references: &[ModuleReference],
        cancel: &CancellationToken,
    ) -> RestoreFailures {
        let mut failures = RestoreFailures::new();
        let mut by_scheme: BTreeMap<&'static str, Vec<ModuleReference>> = BTreeMap::new();

        for reference in references {
            match self.registry(reference) {
                Ok(registry) => by_scheme
                    .entry(registry.scheme())
                    .or_default()
                    .push(reference.clone()),
                Err(failure) => {
                    failures.insert(reference.clone(), failure);
                }
            }
        }

        for (scheme, batch) in by_scheme {
            if let Some(registry) = self.registries.get(scheme) {
                failures.extend(registry.restore_modules(&batch, cancel).await);
            }
        }

        if failures.is_empty() {
            tracing::debug!(count = references.len(), "All modules restored");
        } else {
            tracing::warn!(
                count = references.len(),
                failed = failures.len(),
                "Some modules could not be restored"
            );
        }

        failures
    }

    /// Returns the capabilities of the registry owning `reference`, or an
    /// empty set if its scheme is not registered.
    #[must_use]
    pub fn registry_capabilities(&self, reference: &ModuleReference) -> RegistryCapabilities {
        self.registry(reference)
            .map_or_else(|_| RegistryCapabilities::empty(), |registry| registry.capabilities())
    }

    /// Publishes the contents of `module_directory` under `reference`.
    ///
    /// The registry is only called if it declares the publish capability.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotPublishable`] if the target registry
    /// cannot publish, or the registry's error if publishing fails.
    pub async fn publish_module(
        &self,
        reference: &ModuleReference,
        module_directory: &Path,
        cancel: &CancellationToken,
    ) -> Result<PublishOutcome, DispatchError> {
        let registry = self
            .registry(reference)
            .map_err(DispatchError::UnknownScheme)?;

        if !registry.capabilities().can_publish() {
            return Err(DispatchError::NotPublishable(
                FailureDetail::module_not_publishable(&reference.to_string()),
            ));
        }

        Ok(registry
            .publish_module(reference, module_directory, cancel)
            .await?)
    }

    fn registry(&self, reference: &ModuleReference) -> Result<&Arc<dyn ModuleRegistry>, FailureDetail> {
        self.registries
            .get(reference.scheme())
            .ok_or_else(|| self.unknown_scheme(reference.scheme()))
    }

    fn unknown_scheme(&self, scheme: &str) -> FailureDetail {
        let available = self
            .registries
            .keys()
            .filter(|scheme| !scheme.is_empty())
            .map(|scheme| format!("\"{scheme}\""))
            .collect::<Vec<_>>()
            .join(", ");

        ReferenceError::UnknownScheme {
            scheme: scheme.to_string(),
            available,
        }
        .into()
    }
}
