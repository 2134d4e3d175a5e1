//! Local artifact cache.
//!
//! Every OCI reference maps to one directory under the cache root. With the
//! default [`CacheLayout::Nested`] layout that directory is
//! `<root>/<registry>/<repository segments...>/<tag>/`, and the restored
//! module's entry point lives directly inside it.
//!
//! The nested layout is ambiguous: `host/foo/bar:baz` and `host/foo:bar`
//! produce nested directories (`foo/bar/baz` inside `foo/bar`). Callers that
//! cannot rule that out use [`CacheLayout::Hashed`], which names the
//! directory after the digest of `repository:tag`.
//!
//! Files are written through a temporary sibling and renamed into place, and
//! writers to the same directory are serialized with an async lock.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use modreg_core::OciArtifactModuleReference;
use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::oci::{compute_digest, trim_digest, Descriptor};

/// Mapping from references to cache directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheLayout {
    /// `<root>/<registry>/<repository segments...>/<tag>/`.
    #[default]
    Nested,

    /// `<root>/<registry>/<sha256 of "repository:tag">/`.
    Hashed,
}

/// File-based cache of restored module artifacts.
#[derive(Debug)]
pub struct ArtifactCache {
    root: PathBuf,
    layout: CacheLayout,
    entry_point: String,
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl ArtifactCache {
    /// Creates a cache rooted at `root`.
    ///
    /// No I/O happens until an artifact is written.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, layout: CacheLayout, entry_point: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            layout,
            entry_point: entry_point.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a cache from the registry configuration.
    #[must_use]
    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(&config.cache_root, config.cache_layout, &config.entry_point)
    }

    /// Returns the cache root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the entry-point file name.
    #[must_use]
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Returns the directory holding the artifact of `reference`.
    ///
    /// This is a pure function of the cache root, layout and reference.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::PathBuf;
    /// use modreg_core::OciArtifactModuleReference;
    /// use modreg_registry::{ArtifactCache, CacheLayout};
    ///
    /// let cache = ArtifactCache::new("/cache", CacheLayout::Nested, "main.bicep");
    /// let reference =
    ///     OciArtifactModuleReference::parse("myregistry.azurecr.io/bicep/modules/storage:v1").unwrap();
    ///
    /// assert_eq!(
    ///     cache.module_directory(&reference),
    ///     PathBuf::from("/cache/myregistry.azurecr.io/bicep/modules/storage/v1"),
    /// );
    /// ```
    #[must_use]
    pub fn module_directory(&self, reference: &OciArtifactModuleReference) -> PathBuf {
        let mut path = self.root.join(reference.registry());
        match self.layout {
            CacheLayout::Nested => {
                for segment in reference.repository_segments() {
                    path.push(segment);
                }
                path.push(reference.tag());
            }
            CacheLayout::Hashed => {
                let key = format!("{}:{}", reference.repository(), reference.tag());
                path.push(trim_digest(&compute_digest(key.as_bytes())));
            }
        }
        path
    }

    /// Returns the path of the entry-point file of `reference`.
    #[must_use]
    pub fn entry_point_path(&self, reference: &OciArtifactModuleReference) -> PathBuf {
        self.module_directory(reference).join(&self.entry_point)
    }

    /// Returns true if the entry point of `reference` exists.
    #[must_use]
    pub fn contains(&self, reference: &OciArtifactModuleReference) -> bool {
        self.entry_point_path(reference).is_file()
    }

    /// Acquires the write lock of a module directory.
    ///
    /// Holders of the returned guard are the only in-process writers of
    /// `directory`.
    pub async fn lock(&self, directory: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(
                locks
                    .entry(directory.to_path_buf())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// Creates a module directory and its parents.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LocalStorage`] if the directory cannot be
    /// created.
    pub fn create_module_directory(directory: &Path) -> Result<(), RegistryError> {
        std::fs::create_dir_all(directory).map_err(|e| RegistryError::LocalStorage {
            message: "Unable to create the local module directory.".to_string(),
            path: directory.to_path_buf(),
            source: e,
        })
    }

    /// Atomically writes `data` to `file_name` inside `directory`.
    ///
    /// The content goes to a temporary file in the same directory first and
    /// is renamed over the destination, so readers never observe a partial
    /// file.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LocalStorage`] if the file cannot be written.
    pub fn write_file(
        directory: &Path,
        file_name: &str,
        data: &[u8],
    ) -> Result<PathBuf, RegistryError> {
        let destination = directory.join(file_name);
        let parent = destination.parent().unwrap_or(directory);
        Self::create_module_directory(parent)?;

        let storage_error = |e: std::io::Error| RegistryError::LocalStorage {
            message: format!("Unable to write the module file \"{file_name}\"."),
            path: destination.clone(),
            source: e,
        };

        let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(storage_error)?;
        temp.write_all(data).map_err(storage_error)?;
        temp.as_file().sync_all().map_err(storage_error)?;
        temp.persist(&destination)
            .map_err(|e| storage_error(e.error))?;

        tracing::trace!(path = %destination.display(), size = data.len(), "Wrote module file");
        Ok(destination)
    }

    /// Returns the file name a layer restores to.
    ///
    /// The title annotation is used when it is a safe relative path;
    /// otherwise the digest without its algorithm prefix.
    #[must_use]
    pub fn layer_file_name(descriptor: &Descriptor) -> String {
        descriptor
            .title()
            .filter(|title| is_safe_relative_path(title))
            .map_or_else(|| descriptor.digest_value().to_string(), ToString::to_string)
    }
}

/// Returns true if `path` is non-empty, relative and never leaves its base.
fn is_safe_relative_path(path: &str) -> bool {
    let path = Path::new(path);
    path.components().next().is_some()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
        && path.file_name().is_some()
}
