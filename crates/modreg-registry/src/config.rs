//! Configuration types for the registry client.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::HeaderValue;
use url::Url;

use crate::cache::CacheLayout;
use crate::error::RegistryError;

/// Default name of the file downstream compilation treats as a module's root.
pub const DEFAULT_ENTRY_POINT: &str = "main.bicep";

/// Configuration for the registry client.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Root directory of the local artifact cache.
    pub cache_root: PathBuf,

    /// How references map to directories under the cache root.
    pub cache_layout: CacheLayout,

    /// File name of a restored module's entry point.
    pub entry_point: String,

    /// Authentication configuration.
    pub auth: RegistryAuth,

    /// Request timeout.
    pub timeout: Duration,

    /// TLS configuration for mTLS.
    pub tls: Option<TlsConfig>,

    /// User agent string.
    pub user_agent: String,

    /// Talk to registries over plain HTTP instead of HTTPS.
    pub plain_http: bool,

    /// Maximum number of references restored at the same time.
    pub max_concurrent_restores: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new(default_cache_root())
    }
}

impl RegistryConfig {
    /// Creates a new registry configuration with the given cache root.
    ///
    /// # Examples
    ///
    /// ```
    /// use modreg_registry::RegistryConfig;
    ///
    /// let config = RegistryConfig::new("/tmp/artifacts");
    /// assert_eq!(config.entry_point, "main.bicep");
    /// assert!(!config.plain_http);
    /// ```
    #[must_use]
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            cache_layout: CacheLayout::Nested,
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            auth: RegistryAuth::None,
            timeout: Duration::from_secs(30),
            tls: None,
            user_agent: format!("modreg-registry/{}", env!("CARGO_PKG_VERSION")),
            plain_http: false,
            max_concurrent_restores: 1,
        }
    }

    /// Sets the cache layout.
    #[must_use]
    pub const fn with_cache_layout(mut self, layout: CacheLayout) -> Self {
        self.cache_layout = layout;
        self
    }

    /// Sets the entry-point file name.
    #[must_use]
    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    /// Sets the authentication method.
    #[must_use]
    pub fn with_auth(mut self, auth: RegistryAuth) -> Self {
        self.auth = auth;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the TLS configuration.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Uses plain HTTP instead of HTTPS.
    #[must_use]
    pub const fn with_plain_http(mut self, plain_http: bool) -> Self {
        self.plain_http = plain_http;
        self
    }

    /// Sets the maximum number of concurrent restores (at least one).
    #[must_use]
    pub fn with_max_concurrent_restores(mut self, max: usize) -> Self {
        self.max_concurrent_restores = max.max(1);
        self
    }

    /// Returns the base URL of a registry host.
    ///
    /// # Examples
    ///
    /// ```
    /// use modreg_registry::RegistryConfig;
    ///
    /// let config = RegistryConfig::new("/tmp/artifacts");
    /// let url = config.registry_url("myregistry.azurecr.io").unwrap();
    /// assert_eq!(url.as_str(), "https://myregistry.azurecr.io/");
    ///
    /// let config = config.with_plain_http(true);
    /// let url = config.registry_url("localhost:5000").unwrap();
    /// assert_eq!(url.as_str(), "http://localhost:5000/");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the host does not form a valid URL.
    pub fn registry_url(&self, registry: &str) -> Result<Url, RegistryError> {
        let scheme = if self.plain_http { "http" } else { "https" };
        let url = format!("{scheme}://{registry}");
        Url::parse(&url).map_err(|_| RegistryError::InvalidUrl { url })
    }
}

/// Default cache root: `~/.modreg/artifacts`.
fn default_cache_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".modreg")
        .join("artifacts")
}

/// Source of the authorization presented to a registry.
///
/// The provider is handed to the client once, at construction, and asked for
/// a header value before every request.
pub trait CredentialProvider: std::fmt::Debug + Send + Sync {
    /// Returns the `Authorization` header for requests to `registry`, or
    /// `None` for anonymous access.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials cannot be produced.
    fn authorization(&self, registry: &str) -> Result<Option<HeaderValue>, RegistryError>;
}

/// Authentication methods for registry access.
#[derive(Debug, Clone, Default)]
pub enum RegistryAuth {
    /// No authentication (for local development).
    #[default]
    None,

    /// Basic authentication (username/password or username/token).
    Basic {
        /// Username.
        username: String,
        /// Password or token.
        password: String,
    },

    /// Bearer token authentication (`OAuth2` / service account).
    Bearer {
        /// Token value.
        token: String,
    },
}

impl RegistryAuth {
    /// Creates basic authentication.
    ///
    /// # Examples
    ///
    /// ```
    /// use modreg_registry::RegistryAuth;
    ///
    /// let auth = RegistryAuth::basic("user", "pass");
    /// ```
    #[must_use]
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Creates bearer token authentication.
    ///
    /// # Examples
    ///
    /// ```
    /// use modreg_registry::RegistryAuth;
    ///
    /// let auth = RegistryAuth::bearer("my-token");
    /// ```
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }
}

impl CredentialProvider for RegistryAuth {
    fn authorization(&self, _registry: &str) -> Result<Option<HeaderValue>, RegistryError> {
        match self {
            Self::None => Ok(None),
            Self::Basic { username, password } => {
                let credentials = base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    format!("{username}:{password}"),
                );
                let mut value = HeaderValue::from_str(&format!("Basic {credentials}"))
                    .map_err(|_| RegistryError::AuthenticationFailed {
                        message: "Invalid credentials".to_string(),
                    })?;
                value.set_sensitive(true);
                Ok(Some(value))
            }
            Self::Bearer { token } => {
                let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                    RegistryError::AuthenticationFailed {
                        message: "Invalid token".to_string(),
                    }
                })?;
                value.set_sensitive(true);
                Ok(Some(value))
            }
        }
    }
}

/// TLS configuration for mTLS connections.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to CA certificate file.
    pub ca_cert: Option<PathBuf>,

    /// Path to client certificate file.
    pub client_cert: Option<PathBuf>,

    /// Path to client private key file.
    pub client_key: Option<PathBuf>,

    /// Whether to skip certificate verification (NOT recommended for production).
    pub insecure_skip_verify: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TlsConfig {
    /// Creates a new TLS configuration with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ca_cert: None,
            client_cert: None,
            client_key: None,
            insecure_skip_verify: false,
        }
    }

    /// Sets the CA certificate path.
    #[must_use]
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    /// Sets client certificate and key paths for mTLS.
    #[must_use]
    pub fn with_client_cert(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.client_cert = Some(cert.into());
        self.client_key = Some(key.into());
        self
    }

    /// Enables insecure mode (skips certificate verification).
    ///
    /// # Warning
    ///
    /// This should only be used for testing. Never use in production.
    #[must_use]
    pub const fn insecure(mut self) -> Self {
        self.insecure_skip_verify = true;
        self
    }
}
