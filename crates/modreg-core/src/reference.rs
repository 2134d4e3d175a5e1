//! Module references.
//!
//! A module reference is the textual coordinate a module declaration uses to
//! name another module. Two kinds exist:
//!
//! - local references: a relative file path with no scheme, such as
//!   `./modules/storage.bicep`;
//! - OCI artifact references: `br:<registry>/<repository>:<tag>`, such as
//!   `br:myregistry.azurecr.io/bicep/modules/storage:v1`.
//!
//! Parsing and rendering are exact inverses: the canonical text of a parsed
//! reference parses back to an equal reference.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{ReferenceError, Result};

/// Scheme of OCI artifact references.
pub const OCI_SCHEME: &str = "br";

/// Scheme of local file references (no prefix).
pub const LOCAL_SCHEME: &str = "";

/// All registered schemes, in dispatch order.
pub const SCHEMES: [&str; 2] = [LOCAL_SCHEME, OCI_SCHEME];

/// Maximum tag length allowed by the OCI distribution specification.
const MAX_TAG_LENGTH: usize = 128;

/// Maximum DNS label length.
const MAX_LABEL_LENGTH: usize = 63;

/// A parsed module reference.
///
/// Equality and hashing follow the canonical textual form: two references
/// are equal iff they render to the same string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModuleReference {
    /// Reference to a module file on the local file system.
    Local(LocalModuleReference),

    /// Reference to an artifact in an OCI registry.
    Oci(OciArtifactModuleReference),
}

impl ModuleReference {
    /// Parses a fully qualified module reference.
    ///
    /// # Examples
    ///
    /// ```
    /// use modreg_core::ModuleReference;
    ///
    /// let reference = ModuleReference::parse("br:example.azurecr.io/modules/storage:v1").unwrap();
    /// assert_eq!(reference.scheme(), "br");
    ///
    /// let reference = ModuleReference::parse("./storage.bicep").unwrap();
    /// assert_eq!(reference.scheme(), "");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the scheme is not registered or the remainder of
    /// the reference is invalid for that scheme.
    pub fn parse(text: &str) -> Result<Self> {
        let (scheme, raw) = split_scheme(text);
        match scheme {
            LOCAL_SCHEME => LocalModuleReference::parse(raw).map(Self::Local),
            OCI_SCHEME => OciArtifactModuleReference::parse(raw).map(Self::Oci),
            other => Err(ReferenceError::UnknownScheme {
                scheme: other.to_string(),
                available: available_schemes_display(),
            }),
        }
    }

    /// Returns the scheme of this reference.
    #[must_use]
    pub const fn scheme(&self) -> &'static str {
        match self {
            Self::Local(_) => LOCAL_SCHEME,
            Self::Oci(_) => OCI_SCHEME,
        }
    }

    /// Returns the canonical textual form of this reference.
    #[must_use]
    pub fn fully_qualified_reference(&self) -> String {
        self.to_string()
    }

    /// Returns the OCI artifact reference, if this is one.
    #[must_use]
    pub const fn as_oci(&self) -> Option<&OciArtifactModuleReference> {
        match self {
            Self::Oci(reference) => Some(reference),
            Self::Local(_) => None,
        }
    }

    /// Returns the local reference, if this is one.
    #[must_use]
    pub const fn as_local(&self) -> Option<&LocalModuleReference> {
        match self {
            Self::Local(reference) => Some(reference),
            Self::Oci(_) => None,
        }
    }
}

impl fmt::Display for ModuleReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(reference) => reference.fmt(f),
            Self::Oci(reference) => reference.fmt(f),
        }
    }
}

impl FromStr for ModuleReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<OciArtifactModuleReference> for ModuleReference {
    fn from(reference: OciArtifactModuleReference) -> Self {
        Self::Oci(reference)
    }
}

impl From<LocalModuleReference> for ModuleReference {
    fn from(reference: LocalModuleReference) -> Self {
        Self::Local(reference)
    }
}

/// Splits reference text into its scheme and the scheme-specific remainder.
///
/// Text without a `:` has the local scheme and is returned whole.
///
/// # Examples
///
/// ```
/// use modreg_core::reference::split_scheme;
///
/// assert_eq!(split_scheme("br:host/repo:v1"), ("br", "host/repo:v1"));
/// assert_eq!(split_scheme("./main.bicep"), ("", "./main.bicep"));
/// ```
#[must_use]
pub fn split_scheme(text: &str) -> (&str, &str) {
    text.split_once(':').unwrap_or((LOCAL_SCHEME, text))
}

/// Renders the registered schemes for diagnostics.
#[must_use]
pub fn available_schemes_display() -> String {
    SCHEMES
        .iter()
        .filter(|scheme| !scheme.is_empty())
        .map(|scheme| format!("\"{scheme}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Reference to a module file relative to the referencing module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalModuleReference {
    path: String,
}

impl LocalModuleReference {
    /// Parses a local module path.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is empty or absolute.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(ReferenceError::Empty);
        }

        if raw.starts_with('/') || raw.starts_with('\\') || Path::new(raw).is_absolute() {
            return Err(ReferenceError::InvalidLocalPath {
                path: raw.to_string(),
            });
        }

        Ok(Self {
            path: raw.to_string(),
        })
    }

    /// Returns the relative path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for LocalModuleReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Reference to an artifact in an OCI registry.
///
/// Canonical form: `br:<registry>/<repository>:<tag>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OciArtifactModuleReference {
    registry: String,
    repository: String,
    tag: String,
}

impl OciArtifactModuleReference {
    /// Parses the scheme-less part of an OCI reference
    /// (`<registry>/<repository>:<tag>`).
    ///
    /// # Examples
    ///
    /// ```
    /// use modreg_core::OciArtifactModuleReference;
    ///
    /// let reference =
    ///     OciArtifactModuleReference::parse("myregistry.azurecr.io/bicep/modules/storage:v1").unwrap();
    /// assert_eq!(reference.registry(), "myregistry.azurecr.io");
    /// assert_eq!(reference.repository(), "bicep/modules/storage");
    /// assert_eq!(reference.tag(), "v1");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid part of the reference.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(ReferenceError::Empty);
        }

        let (registry, path) =
            raw.split_once('/')
                .ok_or_else(|| ReferenceError::MissingRepository {
                    reference: raw.to_string(),
                })?;

        if !is_valid_registry(registry) {
            return Err(ReferenceError::InvalidRegistry {
                registry: registry.to_string(),
                reference: raw.to_string(),
            });
        }

        let (repository, tag) = path
            .rsplit_once(':')
            .ok_or_else(|| ReferenceError::MissingTag {
                reference: raw.to_string(),
            })?;

        if repository.is_empty() {
            return Err(ReferenceError::MissingRepository {
                reference: raw.to_string(),
            });
        }

        if !is_valid_repository(repository) {
            return Err(ReferenceError::InvalidRepository {
                repository: repository.to_string(),
                reference: raw.to_string(),
            });
        }

        if !is_valid_tag(tag) {
            return Err(ReferenceError::InvalidTag {
                tag: tag.to_string(),
                reference: raw.to_string(),
            });
        }

        Ok(Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Returns the registry host (including the port, if any).
    #[must_use]
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Returns the `/`-separated repository path.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Returns the repository path segments.
    pub fn repository_segments(&self) -> impl Iterator<Item = &str> {
        self.repository.split('/')
    }

    /// Returns the tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Returns the scheme-less form (`<registry>/<repository>:<tag>`).
    #[must_use]
    pub fn unqualified_reference(&self) -> String {
        format!("{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

impl fmt::Display for OciArtifactModuleReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{OCI_SCHEME}:{}/{}:{}",
            self.registry, self.repository, self.tag
        )
    }
}

fn is_valid_registry(registry: &str) -> bool {
    let (host, port) = match registry.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (registry, None),
    };

    if let Some(port) = port {
        if port.is_empty() || port.len() > 5 || !port.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
    }

    !host.is_empty()
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= MAX_LABEL_LENGTH
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        })
}

fn is_valid_repository(repository: &str) -> bool {
    repository.split('/').all(|segment| {
        let bytes = segment.as_bytes();
        match (bytes.first(), bytes.last()) {
            (Some(first), Some(last)) => {
                is_lower_alphanumeric(*first)
                    && is_lower_alphanumeric(*last)
                    && bytes
                        .iter()
                        .all(|&b| is_lower_alphanumeric(b) || matches!(b, b'.' | b'_' | b'-'))
            }
            _ => false,
        }
    })
}

const fn is_lower_alphanumeric(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit()
}

fn is_valid_tag(tag: &str) -> bool {
    let bytes = tag.as_bytes();
    match bytes.first() {
        Some(&first) if first.is_ascii_alphanumeric() || first == b'_' => {
            bytes.len() <= MAX_TAG_LENGTH
                && bytes
                    .iter()
                    .all(|&b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
        }
        _ => false,
    }
}
