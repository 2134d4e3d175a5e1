//! OCI Distribution Specification types and the manifest codec.
//!
//! Manifests are encoded with lower-camel-case keys and absent optional
//! fields omitted. Annotation maps are ordered, so encoding equal manifests
//! always yields identical bytes; the manifest digest depends on that.

use std::collections::BTreeMap;
use std::io::Read;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RegistryError;

/// Annotation holding the file name of a layer.
pub const ANNOTATION_TITLE: &str = "org.opencontainers.image.title";

/// Schema version of OCI image manifests.
pub const MANIFEST_SCHEMA_VERSION: u32 = 2;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// OCI media types for module artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaType(String);

impl MediaType {
    /// OCI image manifest media type.
    pub const OCI_MANIFEST: &'static str = "application/vnd.oci.image.manifest.v1+json";

    /// Module configuration blob media type.
    pub const MODULE_CONFIG: &'static str = "application/vnd.modreg.module.config.v1+json";

    /// Module source layer media type.
    pub const MODULE_LAYER: &'static str = "application/vnd.modreg.module.layer.v1+text";

    /// Creates a new media type.
    #[must_use]
    pub fn new(media_type: impl Into<String>) -> Self {
        Self(media_type.into())
    }

    /// Returns the media type string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Creates the module config media type.
    #[must_use]
    pub fn module_config() -> Self {
        Self::new(Self::MODULE_CONFIG)
    }

    /// Creates the module layer media type.
    #[must_use]
    pub fn module_layer() -> Self {
        Self::new(Self::MODULE_LAYER)
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MediaType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Serialize for MediaType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MediaType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self(s))
    }
}

/// Content hashing algorithm used for digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    /// SHA-256, rendered as `sha256:<hex>`.
    #[default]
    Sha256,
}

impl DigestAlgorithm {
    /// Returns the algorithm identifier used as the digest prefix.
    #[must_use]
    pub const fn identifier(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }

    /// Computes the digest of in-memory content.
    #[must_use]
    pub fn digest(self, data: &[u8]) -> String {
        match self {
            Self::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(data);
                format!("{}:{}", self.identifier(), hex::encode(hasher.finalize()))
            }
        }
    }

    /// Computes the digest and byte length of everything `reader` yields.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub fn digest_reader(self, reader: &mut impl Read) -> std::io::Result<(String, u64)> {
        match self {
            Self::Sha256 => {
                let mut hasher = Sha256::new();
                let size = std::io::copy(reader, &mut hasher)?;
                Ok((
                    format!("{}:{}", self.identifier(), hex::encode(hasher.finalize())),
                    size,
                ))
            }
        }
    }
}

/// Computes the SHA-256 digest of data.
#[must_use]
pub fn compute_digest(data: &[u8]) -> String {
    DigestAlgorithm::Sha256.digest(data)
}

/// Checks that `data` hashes to `expected`.
///
/// # Errors
///
/// Returns [`RegistryError::DigestMismatch`] if the digests differ.
pub fn verify_digest(expected: &str, data: &[u8]) -> Result<(), RegistryError> {
    let actual = compute_digest(data);
    if actual == expected {
        Ok(())
    } else {
        Err(RegistryError::DigestMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Strips the algorithm prefix from a digest.
///
/// # Examples
///
/// ```
/// use modreg_registry::oci::trim_digest;
///
/// assert_eq!(trim_digest("sha256:abc123"), "abc123");
/// assert_eq!(trim_digest("abc123"), "abc123");
/// ```
#[must_use]
pub fn trim_digest(digest: &str) -> &str {
    digest.split_once(':').map_or(digest, |(_, value)| value)
}

/// OCI content descriptor.
///
/// A descriptor describes the disposition of targeted content. It includes
/// the type of the content, a content identifier (digest), and the byte-size
/// of the raw content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content.
    pub media_type: MediaType,

    /// Digest of the targeted content.
    pub digest: String,

    /// Size in bytes of the content.
    pub size: u64,

    /// Optional annotations (key-value metadata).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl Descriptor {
    /// Creates a new descriptor.
    ///
    /// # Examples
    ///
    /// ```
    /// use modreg_registry::{Descriptor, MediaType};
    ///
    /// let desc = Descriptor::new(
    ///     MediaType::module_layer(),
    ///     "sha256:abc123...",
    ///     1024,
    /// );
    /// ```
    #[must_use]
    pub fn new(media_type: MediaType, digest: impl Into<String>, size: u64) -> Self {
        Self {
            media_type,
            digest: digest.into(),
            size,
            annotations: None,
        }
    }

    /// Adds an annotation to the descriptor.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Returns the title annotation, if present.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.annotations
            .as_ref()
            .and_then(|annotations| annotations.get(ANNOTATION_TITLE))
            .map(String::as_str)
    }

    /// Returns the digest algorithm (e.g., "sha256").
    #[must_use]
    pub fn digest_algorithm(&self) -> &str {
        self.digest.split(':').next().unwrap_or("sha256")
    }

    /// Returns the digest value (without algorithm prefix).
    #[must_use]
    pub fn digest_value(&self) -> &str {
        trim_digest(&self.digest)
    }
}

/// OCI Image Manifest: one config blob and an ordered list of layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Schema version (always 2).
    pub schema_version: u32,

    /// Configuration descriptor.
    pub config: Descriptor,

    /// Layers that make up the artifact.
    #[serde(default)]
    pub layers: Vec<Descriptor>,

    /// Optional annotations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl Manifest {
    /// Creates a new manifest with the given config and layers.
    ///
    /// # Examples
    ///
    /// ```
    /// use modreg_registry::{Descriptor, Manifest, MediaType};
    ///
    /// let config = Descriptor::new(MediaType::module_config(), "sha256:c0ffee", 2);
    /// let layer = Descriptor::new(MediaType::module_layer(), "sha256:abc123...", 1024);
    ///
    /// let manifest = Manifest::new(config, vec![layer]);
    /// assert_eq!(manifest.schema_version, 2);
    /// ```
    #[must_use]
    pub const fn new(config: Descriptor, layers: Vec<Descriptor>) -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            config,
            layers,
            annotations: None,
        }
    }

    /// Adds an annotation to the manifest.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Encodes the manifest in its canonical wire form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RegistryError> {
        serde_json::to_vec(self).map_err(Into::into)
    }

    /// Decodes a manifest from its wire form.
    ///
    /// A leading UTF-8 byte order mark is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidManifest`] if the payload is not
    /// well-formed JSON, lacks `schemaVersion` or `config`, or declares a
    /// schema version other than 2.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, RegistryError> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

        let manifest: Self =
            serde_json::from_slice(bytes).map_err(|e| RegistryError::InvalidManifest {
                message: format!("Unable to deserialize artifact manifest content: {e}"),
            })?;

        if manifest.schema_version != MANIFEST_SCHEMA_VERSION {
            return Err(RegistryError::InvalidManifest {
                message: format!(
                    "Unsupported manifest schema version {}",
                    manifest.schema_version
                ),
            });
        }

        Ok(manifest)
    }
}

/// Error response from registry API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// List of errors.
    pub errors: Vec<RegistryApiError>,
}

impl ErrorResponse {
    /// Joins the error messages into one line.
    #[must_use]
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Individual error from registry API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryApiError {
    /// Error code.
    pub code: String,

    /// Human-readable message.
    #[serde(default)]
    pub message: String,

    /// Additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}
