//! Per-scheme module registries.
//!
//! A [`ModuleRegistry`] knows how to parse, locate, restore and publish the
//! references of one scheme. [`OciModuleRegistry`] drives an
//! [`OciArtifactClient`]; [`LocalModuleRegistry`] resolves plain file paths
//! and never touches the network.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bitflags::bitflags;
use futures::stream::{self, StreamExt};
use modreg_core::{
    FailureDetail, LocalModuleReference, ModuleReference, OciArtifactModuleReference,
    LOCAL_SCHEME, OCI_SCHEME,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::client::{FailureReason, OciArtifactClient, RegistryClient, RestoreStatus};
use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::oci::MediaType;
use crate::stream::StreamDescriptor;
use crate::timer::ExecutionTimer;

bitflags! {
    /// Operations a registry supports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RegistryCapabilities: u8 {
        /// Artifacts can be pulled into the local cache.
        const RESTORE = 1 << 0;
        /// Artifacts can be pushed to the remote registry.
        const PUBLISH = 1 << 1;
    }
}

impl RegistryCapabilities {
    /// Returns true if publishing is supported.
    #[must_use]
    pub const fn can_publish(self) -> bool {
        self.contains(Self::PUBLISH)
    }
}

/// Failed references of a restore batch. Successful references are absent.
pub type RestoreFailures = BTreeMap<ModuleReference, FailureDetail>;

/// Result of publishing a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Canonical reference the module was published to.
    pub reference: String,

    /// Digest of the uploaded manifest.
    pub manifest_digest: String,

    /// Number of layers in the artifact.
    pub layers: usize,
}

/// Module-level metadata stored as the artifact's config blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConfig {
    /// File name of the module's entry point.
    pub entry_point: String,

    /// Relative paths of all files in the module, sorted.
    pub files: Vec<String>,
}

/// Scheme-specific module operations.
#[async_trait]
pub trait ModuleRegistry: std::fmt::Debug + Send + Sync {
    /// Scheme handled by this registry.
    fn scheme(&self) -> &'static str;

    /// Operations supported by this registry.
    fn capabilities(&self) -> RegistryCapabilities;

    /// Parses the scheme-specific part of a reference.
    ///
    /// # Errors
    ///
    /// Returns a failure detail describing the invalid part.
    fn try_parse_module_reference(&self, raw: &str) -> Result<ModuleReference, FailureDetail>;

    /// Returns true if the module is missing from the local cache.
    fn is_module_restore_required(&self, reference: &ModuleReference) -> bool;

    /// Returns the local path of the module's entry point.
    ///
    /// `parent` is the path of the module that declared the reference.
    ///
    /// # Errors
    ///
    /// Returns a failure detail if the path cannot be determined.
    fn try_get_local_module_entry_point_path(
        &self,
        parent: &Path,
        reference: &ModuleReference,
    ) -> Result<PathBuf, FailureDetail>;

    /// Restores `references`, returning only the ones that failed.
    async fn restore_modules(
        &self,
        references: &[ModuleReference],
        cancel: &CancellationToken,
    ) -> RestoreFailures;

    /// Publishes the contents of `module_directory` under `reference`.
    ///
    /// # Errors
    ///
    /// Returns an error if the module is invalid or the upload fails.
    async fn publish_module(
        &self,
        reference: &ModuleReference,
        module_directory: &Path,
        cancel: &CancellationToken,
    ) -> Result<PublishOutcome, RegistryError>;
}

/// Registry for `br:` references backed by an OCI registry.
#[derive(Debug)]
pub struct OciModuleRegistry {
    client: Arc<dyn OciArtifactClient>,
    entry_point: String,
    max_concurrent_restores: usize,
}

impl OciModuleRegistry {
    /// Creates a registry over `client` that restores one module at a time.
    ///
    /// Published modules must contain the client's entry-point file.
    #[must_use]
    pub fn new(client: Arc<dyn OciArtifactClient>) -> Self {
        Self {
            entry_point: client.entry_point().to_string(),
            client,
            max_concurrent_restores: 1,
        }
    }

    /// Creates a registry with an HTTP client built from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_config(config: RegistryConfig) -> Result<Self, RegistryError> {
        let max_concurrent_restores = config.max_concurrent_restores;
        let client = RegistryClient::new(config)?;

        Ok(Self::new(Arc::new(client)).with_max_concurrent_restores(max_concurrent_restores))
    }

    /// Sets how many modules are restored at the same time (at least one).
    #[must_use]
    pub fn with_max_concurrent_restores(mut self, max: usize) -> Self {
        self.max_concurrent_restores = max.max(1);
        self
    }

    /// Returns the artifact client.
    #[must_use]
    pub fn client(&self) -> &dyn OciArtifactClient {
        self.client.as_ref()
    }

    async fn restore_one(
        &self,
        reference: &OciArtifactModuleReference,
        cancel: &CancellationToken,
    ) -> Option<FailureDetail> {
        let fully_qualified = reference.to_string();
        let mut timer = ExecutionTimer::start(format!("Restore module {fully_qualified}"));

        match self.client.pull(reference, cancel).await {
            RestoreStatus::Succeeded => None,
            RestoreStatus::Failed(FailureReason::NotFound) => {
                timer.on_fail("Module not found.");
                Some(FailureDetail::module_not_found(&fully_qualified))
            }
            RestoreStatus::Failed(FailureReason::Message(message)) => {
                timer.on_fail(message.as_str());
                Some(FailureDetail::module_restore_failed_with_message(
                    &fully_qualified,
                    &message,
                ))
            }
        }
    }

    fn unsupported(&self, reference: &ModuleReference) -> FailureDetail {
        FailureDetail::unsupported_reference(&reference.to_string(), self.scheme())
    }
}

#[async_trait]
impl ModuleRegistry for OciModuleRegistry {
    fn scheme(&self) -> &'static str {
        OCI_SCHEME
    }

    fn capabilities(&self) -> RegistryCapabilities {
        RegistryCapabilities::RESTORE | RegistryCapabilities::PUBLISH
    }

    fn try_parse_module_reference(&self, raw: &str) -> Result<ModuleReference, FailureDetail> {
        OciArtifactModuleReference::parse(raw)
            .map(ModuleReference::Oci)
            .map_err(FailureDetail::from)
    }

    fn is_module_restore_required(&self, reference: &ModuleReference) -> bool {
        reference
            .as_oci()
            .is_some_and(|oci| !self.client.local_entry_point_path(oci).is_file())
    }

    fn try_get_local_module_entry_point_path(
        &self,
        _parent: &Path,
        reference: &ModuleReference,
    ) -> Result<PathBuf, FailureDetail> {
        reference
            .as_oci()
            .map(|oci| self.client.local_entry_point_path(oci))
            .ok_or_else(|| self.unsupported(reference))
    }

    async fn restore_modules(
        &self,
        references: &[ModuleReference],
        cancel: &CancellationToken,
    ) -> RestoreFailures {
        let mut failures = RestoreFailures::new();
        let mut unique = BTreeSet::new();

        for reference in references {
            match reference.as_oci() {
                Some(oci) => {
                    unique.insert(oci);
                }
                None => {
                    failures.insert(reference.clone(), self.unsupported(reference));
                }
            }
        }

        tracing::debug!(
            requested = references.len(),
            unique = unique.len(),
            concurrency = self.max_concurrent_restores,
            "Restoring modules"
        );

        let unique: Vec<OciArtifactModuleReference> = unique.into_iter().cloned().collect();
        let results: Vec<_> = stream::iter(unique)
            .map(|reference| async move {
                let failure = self.restore_one(&reference, cancel).await;
                (reference, failure)
            })
            .buffered(self.max_concurrent_restores)
            .collect()
            .await;

        for (reference, failure) in results {
            if let Some(failure) = failure {
                failures.insert(ModuleReference::Oci(reference), failure);
            }
        }

        failures
    }

    async fn publish_module(
        &self,
        reference: &ModuleReference,
        module_directory: &Path,
        cancel: &CancellationToken,
    ) -> Result<PublishOutcome, RegistryError> {
        let oci = reference
            .as_oci()
            .ok_or_else(|| RegistryError::UnsupportedReference {
                reference: reference.to_string(),
                scheme: self.scheme().to_string(),
            })?;

        let files = collect_module_files(module_directory)?;
        if !files.iter().any(|(title, _)| *title == self.entry_point) {
            return Err(RegistryError::InvalidModule {
                message: format!(
                    "The module directory {} does not contain the entry point \"{}\"",
                    module_directory.display(),
                    self.entry_point
                ),
            });
        }

        let module_config = ModuleConfig {
            entry_point: self.entry_point.clone(),
            files: files.iter().map(|(title, _)| title.clone()).collect(),
        };
        let config = StreamDescriptor::from_bytes(
            serde_json::to_vec(&module_config)?,
            MediaType::module_config(),
        );

        let layers = files
            .iter()
            .map(|(title, path)| {
                StreamDescriptor::from_file(path, MediaType::module_layer())
                    .map(|layer| layer.with_title(title.as_str()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let result = self.client.push(oci, config, layers, cancel).await?;

        Ok(PublishOutcome {
            reference: oci.to_string(),
            manifest_digest: result.manifest_digest,
            layers: result.manifest.layers.len(),
        })
    }
}

/// Registry for scheme-less references to files next to the parent module.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalModuleRegistry;

impl LocalModuleRegistry {
    /// Creates a new local registry.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn resolve(parent: &Path, reference: &LocalModuleReference) -> PathBuf {
        parent
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(reference.path())
    }
}

#[async_trait]
impl ModuleRegistry for LocalModuleRegistry {
    fn scheme(&self) -> &'static str {
        LOCAL_SCHEME
    }

    fn capabilities(&self) -> RegistryCapabilities {
        RegistryCapabilities::empty()
    }

    fn try_parse_module_reference(&self, raw: &str) -> Result<ModuleReference, FailureDetail> {
        LocalModuleReference::parse(raw)
            .map(ModuleReference::Local)
            .map_err(FailureDetail::from)
    }

    fn is_module_restore_required(&self, _reference: &ModuleReference) -> bool {
        false
    }

    fn try_get_local_module_entry_point_path(
        &self,
        parent: &Path,
        reference: &ModuleReference,
    ) -> Result<PathBuf, FailureDetail> {
        reference
            .as_local()
            .map(|local| Self::resolve(parent, local))
            .ok_or_else(|| {
                FailureDetail::unsupported_reference(&reference.to_string(), self.scheme())
            })
    }

    async fn restore_modules(
        &self,
        references: &[ModuleReference],
        _cancel: &CancellationToken,
    ) -> RestoreFailures {
        // local files are never restored
        references
            .iter()
            .filter(|reference| reference.as_local().is_none())
            .map(|reference| {
                (
                    reference.clone(),
                    FailureDetail::unsupported_reference(&reference.to_string(), self.scheme()),
                )
            })
            .collect()
    }

    async fn publish_module(
        &self,
        reference: &ModuleReference,
        _module_directory: &Path,
        _cancel: &CancellationToken,
    ) -> Result<PublishOutcome, RegistryError> {
        Err(RegistryError::UnsupportedReference {
            reference: reference.to_string(),
            scheme: self.scheme().to_string(),
        })
    }
}

/// Lists the regular files under `directory` as `(title, path)` pairs,
/// sorted by title. Titles are relative paths joined with `/`.
fn collect_module_files(directory: &Path) -> Result<Vec<(String, PathBuf)>, RegistryError> {
    if !directory.is_dir() {
        return Err(RegistryError::InvalidModule {
            message: format!("Module directory {} does not exist", directory.display()),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(directory).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map_or_else(|| directory.to_path_buf(), Path::to_path_buf);
            RegistryError::IoError {
                path,
                source: e.into(),
            }
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let title = entry
            .path()
            .strip_prefix(directory)
            .ok()
            .and_then(relative_title)
            .ok_or_else(|| RegistryError::InvalidModule {
                message: format!("Unsupported file name {}", entry.path().display()),
            })?;

        files.push((title, entry.into_path()));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn relative_title(relative: &Path) -> Option<String> {
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_str()?),
            _ => return None,
        }
    }
    (!segments.is_empty()).then(|| segments.join("/"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;
    use crate::cache::{ArtifactCache, CacheLayout};
    use crate::client::PushResult;
    use crate::config::DEFAULT_ENTRY_POINT;
    use crate::oci::{Descriptor, DigestAlgorithm, Manifest};

    /// In-memory artifact client: `available` references restore by writing
    /// their entry point, `broken` ones fail with a message.
    #[derive(Debug)]
    struct FakeClient {
        cache: ArtifactCache,
        available: Vec<String>,
        broken: HashMap<String, String>,
        pulls: Mutex<Vec<String>>,
        pushes: Mutex<Vec<(Descriptor, Vec<Descriptor>, Vec<u8>)>>,
    }

    impl FakeClient {
        fn new(root: &Path) -> Self {
            Self::with_entry_point(root, DEFAULT_ENTRY_POINT)
        }

        fn with_entry_point(root: &Path, entry_point: &str) -> Self {
            Self {
                cache: ArtifactCache::new(root, CacheLayout::Nested, entry_point),
                available: Vec::new(),
                broken: HashMap::new(),
                pulls: Mutex::new(Vec::new()),
                pushes: Mutex::new(Vec::new()),
            }
        }

        fn with_available(mut self, reference: &str) -> Self {
            self.available.push(reference.to_string());
            self
        }

        fn with_broken(mut self, reference: &str, message: &str) -> Self {
            self.broken.insert(reference.to_string(), message.to_string());
            self
        }
    }

    #[async_trait]
    impl OciArtifactClient for FakeClient {
        async fn pull(
            &self,
            reference: &OciArtifactModuleReference,
            _cancel: &CancellationToken,
        ) -> RestoreStatus {
            let text = reference.unqualified_reference();
            self.pulls.lock().push(text.clone());

            if let Some(message) = self.broken.get(&text) {
                return RestoreStatus::Failed(FailureReason::Message(message.clone()));
            }
            if !self.available.contains(&text) {
                return RestoreStatus::Failed(FailureReason::NotFound);
            }

            let directory = self.cache.module_directory(reference);
            ArtifactCache::create_module_directory(&directory).unwrap();
            ArtifactCache::write_file(&directory, self.cache.entry_point(), b"module").unwrap();
            RestoreStatus::Succeeded
        }

        async fn push(
            &self,
            _reference: &OciArtifactModuleReference,
            mut config: StreamDescriptor,
            layers: Vec<StreamDescriptor>,
            _cancel: &CancellationToken,
        ) -> Result<PushResult, RegistryError> {
            let config_descriptor = config.descriptor(DigestAlgorithm::Sha256)?;
            let config_data = config.read_all()?;
            let mut layer_descriptors = Vec::new();
            for mut layer in layers {
                layer_descriptors.push(layer.descriptor(DigestAlgorithm::Sha256)?);
            }

            let manifest = Manifest::new(config_descriptor.clone(), layer_descriptors.clone());
            let manifest_digest = DigestAlgorithm::Sha256.digest(&manifest.to_bytes()?);
            self.pushes
                .lock()
                .push((config_descriptor, layer_descriptors, config_data));

            Ok(PushResult {
                manifest_digest,
                manifest,
            })
        }

        fn local_cache_directory(&self, reference: &OciArtifactModuleReference) -> PathBuf {
            self.cache.module_directory(reference)
        }

        fn local_entry_point_path(&self, reference: &OciArtifactModuleReference) -> PathBuf {
            self.cache.entry_point_path(reference)
        }

        fn entry_point(&self) -> &str {
            self.cache.entry_point()
        }
    }

    fn oci(raw: &str) -> ModuleReference {
        ModuleReference::parse(raw).unwrap()
    }

    #[test]
    fn test_capabilities() {
        let dir = tempfile::tempdir().unwrap();
        let registry = OciModuleRegistry::new(Arc::new(FakeClient::new(dir.path())));

        assert!(registry.capabilities().contains(RegistryCapabilities::RESTORE));
        assert!(registry.capabilities().can_publish());
        assert!(!LocalModuleRegistry::new().capabilities().can_publish());
        assert!(LocalModuleRegistry::new().capabilities().is_empty());
    }

    #[test]
    fn test_entry_point_path() {
        let registry = OciModuleRegistry::new(Arc::new(FakeClient::new(Path::new("/cache"))));
        let reference = oci("br:myregistry.azurecr.io/bicep/modules/storage:v1");

        let path = registry
            .try_get_local_module_entry_point_path(Path::new("/src/main.bicep"), &reference)
            .unwrap();
        assert_eq!(
            path,
            PathBuf::from("/cache/myregistry.azurecr.io/bicep/modules/storage/v1/main.bicep")
        );
    }

    #[test]
    fn test_entry_point_path_rejects_local_reference() {
        let registry = OciModuleRegistry::new(Arc::new(FakeClient::new(Path::new("/cache"))));
        let failure = registry
            .try_get_local_module_entry_point_path(Path::new("/src/main.bicep"), &oci("./a.bicep"))
            .unwrap_err();
        assert_eq!(failure.code, "MR012");
    }

    #[test]
    fn test_parse_reference() {
        let registry = OciModuleRegistry::new(Arc::new(FakeClient::new(Path::new("/cache"))));

        let reference = registry
            .try_parse_module_reference("example.com/foo/bar:v1")
            .unwrap();
        assert_eq!(reference.to_string(), "br:example.com/foo/bar:v1");

        let failure = registry.try_parse_module_reference("example.com/foo").unwrap_err();
        assert_eq!(failure.code, "MR006");
    }

    #[tokio::test]
    async fn test_restore_then_not_required() {
        let dir = tempfile::tempdir().unwrap();
        let client = FakeClient::new(dir.path()).with_available("example.com/foo:v1");
        let registry = OciModuleRegistry::new(Arc::new(client));
        let reference = oci("br:example.com/foo:v1");

        assert!(registry.is_module_restore_required(&reference));

        let failures = registry
            .restore_modules(std::slice::from_ref(&reference), &CancellationToken::new())
            .await;
        assert!(failures.is_empty());
        assert!(!registry.is_module_restore_required(&reference));

        // restoring again leaves the entry point in place
        let failures = registry
            .restore_modules(std::slice::from_ref(&reference), &CancellationToken::new())
            .await;
        assert!(failures.is_empty());
        assert!(!registry.is_module_restore_required(&reference));
    }

    #[tokio::test]
    async fn test_partial_failure_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let client = FakeClient::new(dir.path())
            .with_available("example.com/a:v1")
            .with_available("example.com/c:v1");
        let registry = OciModuleRegistry::new(Arc::new(client));

        let references = vec![
            oci("br:example.com/a:v1"),
            oci("br:example.com/b:v1"),
            oci("br:example.com/c:v1"),
        ];
        let failures = registry
            .restore_modules(&references, &CancellationToken::new())
            .await;

        assert_eq!(failures.len(), 1);
        let failure = &failures[&oci("br:example.com/b:v1")];
        assert!(failure.is_not_found());
        assert_eq!(
            failure.message,
            "Unable to restore the module with reference \"br:example.com/b:v1\": Module not found."
        );
        assert!(!registry.is_module_restore_required(&references[0]));
        assert!(!registry.is_module_restore_required(&references[2]));
    }

    #[tokio::test]
    async fn test_restore_failure_keeps_message() {
        let dir = tempfile::tempdir().unwrap();
        let client = FakeClient::new(dir.path())
            .with_broken("example.com/a:v1", "Unhandled exception: connection reset");
        let registry = OciModuleRegistry::new(Arc::new(client));
        let reference = oci("br:example.com/a:v1");

        let failures = registry
            .restore_modules(std::slice::from_ref(&reference), &CancellationToken::new())
            .await;

        let failure = &failures[&reference];
        assert_eq!(failure.code, "MR011");
        assert!(failure.message.ends_with("Unhandled exception: connection reset"));
    }

    #[tokio::test]
    async fn test_restore_deduplicates() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(FakeClient::new(dir.path()).with_available("example.com/a:v1"));
        let registry = OciModuleRegistry::new(client.clone()).with_max_concurrent_restores(4);

        let references = vec![oci("br:example.com/a:v1"), oci("br:example.com/a:v1")];
        let failures = registry
            .restore_modules(&references, &CancellationToken::new())
            .await;

        assert!(failures.is_empty());
        assert_eq!(client.pulls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_restore_of_distinct_references() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(
            FakeClient::new(dir.path())
                .with_available("example.com/a:v1")
                .with_available("example.com/b:v1")
                .with_available("example.com/d:v1")
                .with_broken("example.com/c:v1", "Unhandled exception: connection reset"),
        );
        let registry = OciModuleRegistry::new(client.clone()).with_max_concurrent_restores(4);

        let references = vec![
            oci("br:example.com/a:v1"),
            oci("br:example.com/b:v1"),
            oci("br:example.com/c:v1"),
            oci("br:example.com/d:v1"),
            oci("br:example.com/e:v1"),
        ];
        let failures = registry
            .restore_modules(&references, &CancellationToken::new())
            .await;

        assert_eq!(client.pulls.lock().len(), 5);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[&references[2]].code, "MR011");
        assert!(failures[&references[4]].is_not_found());
        for reference in [&references[0], &references[1], &references[3]] {
            assert!(!registry.is_module_restore_required(reference));
        }
    }

    #[tokio::test]
    async fn test_restore_rejects_local_reference() {
        let dir = tempfile::tempdir().unwrap();
        let registry = OciModuleRegistry::new(Arc::new(FakeClient::new(dir.path())));
        let reference = oci("./storage.bicep");

        let failures = registry
            .restore_modules(std::slice::from_ref(&reference), &CancellationToken::new())
            .await;
        assert_eq!(failures[&reference].code, "MR012");
    }

    #[tokio::test]
    async fn test_publish_builds_config_and_layers() {
        let cache = tempfile::tempdir().unwrap();
        let module = tempfile::tempdir().unwrap();
        std::fs::write(module.path().join("main.bicep"), "module main").unwrap();
        std::fs::create_dir(module.path().join("lib")).unwrap();
        std::fs::write(module.path().join("lib").join("util.bicep"), "util").unwrap();

        let client = Arc::new(FakeClient::new(cache.path()));
        let registry = OciModuleRegistry::new(client.clone());

        let outcome = registry
            .publish_module(
                &oci("br:example.com/foo:v1"),
                module.path(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.reference, "br:example.com/foo:v1");
        assert_eq!(outcome.layers, 2);
        assert!(outcome.manifest_digest.starts_with("sha256:"));

        let pushes = client.pushes.lock();
        let (config, layers, config_data) = &pushes[0];
        assert_eq!(config.media_type, MediaType::module_config());

        let titles: Vec<_> = layers.iter().filter_map(Descriptor::title).collect();
        assert_eq!(titles, vec!["lib/util.bicep", "main.bicep"]);

        let module_config: ModuleConfig = serde_json::from_slice(config_data).unwrap();
        assert_eq!(module_config.entry_point, "main.bicep");
        assert_eq!(module_config.files, vec!["lib/util.bicep", "main.bicep"]);
    }

    #[tokio::test]
    async fn test_publish_requires_entry_point() {
        let cache = tempfile::tempdir().unwrap();
        let module = tempfile::tempdir().unwrap();
        std::fs::write(module.path().join("other.bicep"), "x").unwrap();

        let client = Arc::new(FakeClient::new(cache.path()));
        let registry = OciModuleRegistry::new(client.clone());

        let err = registry
            .publish_module(
                &oci("br:example.com/foo:v1"),
                module.path(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::InvalidModule { .. }));
        assert!(client.pushes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_publish_uses_client_entry_point() {
        let cache = tempfile::tempdir().unwrap();
        let module = tempfile::tempdir().unwrap();
        std::fs::write(module.path().join("index.bicep"), "module main").unwrap();

        let client = Arc::new(FakeClient::with_entry_point(cache.path(), "index.bicep"));
        let registry = OciModuleRegistry::new(client.clone());
        let reference = oci("br:example.com/foo:v1");

        registry
            .publish_module(&reference, module.path(), &CancellationToken::new())
            .await
            .unwrap();

        let pushes = client.pushes.lock();
        let module_config: ModuleConfig = serde_json::from_slice(&pushes[0].2).unwrap();
        assert_eq!(module_config.entry_point, "index.bicep");
        assert_eq!(
            registry
                .try_get_local_module_entry_point_path(Path::new("/src/main.bicep"), &reference)
                .unwrap()
                .file_name()
                .unwrap(),
            "index.bicep"
        );
    }

    #[tokio::test]
    async fn test_publish_missing_directory() {
        let registry = OciModuleRegistry::new(Arc::new(FakeClient::new(Path::new("/cache"))));
        let err = registry
            .publish_module(
                &oci("br:example.com/foo:v1"),
                Path::new("/nonexistent/module"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidModule { .. }));
    }

    #[test]
    fn test_local_entry_point_relative_to_parent() {
        let registry = LocalModuleRegistry::new();
        let reference = registry
            .try_parse_module_reference("./modules/storage.bicep")
            .unwrap();

        let path = registry
            .try_get_local_module_entry_point_path(Path::new("/src/main.bicep"), &reference)
            .unwrap();
        assert_eq!(path, PathBuf::from("/src/./modules/storage.bicep"));
        assert!(!registry.is_module_restore_required(&reference));
    }

    #[tokio::test]
    async fn test_local_restore_is_noop() {
        let registry = LocalModuleRegistry::new();
        let reference = oci("./storage.bicep");
        let failures = registry
            .restore_modules(&[reference], &CancellationToken::new())
            .await;
        assert!(failures.is_empty());
    }

    #[tokio::test]
    async fn test_local_publish_unsupported() {
        let err = LocalModuleRegistry::new()
            .publish_module(
                &oci("./storage.bicep"),
                Path::new("."),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnsupportedReference { .. }));
    }

    #[test]
    fn test_relative_title() {
        assert_eq!(
            relative_title(Path::new("lib/util.bicep")).as_deref(),
            Some("lib/util.bicep")
        );
        assert_eq!(relative_title(Path::new("../x")), None);
        assert_eq!(relative_title(Path::new("")), None);
    }
}
