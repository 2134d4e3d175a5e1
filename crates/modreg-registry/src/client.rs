//! OCI Distribution API client for module artifacts.
//!
//! [`RegistryClient`] talks to one registry at a time over HTTP and owns the
//! local [`ArtifactCache`]. Pulls never return raw transport errors: every
//! failure is folded into a [`RestoreStatus`].

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use modreg_core::OciArtifactModuleReference;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, CONTENT_TYPE, LOCATION};
use reqwest::{Response, StatusCode};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::cache::ArtifactCache;
use crate::config::{CredentialProvider, RegistryConfig};
use crate::error::RegistryError;
use crate::oci::{verify_digest, Descriptor, DigestAlgorithm, ErrorResponse, Manifest, MediaType};
use crate::stream::StreamDescriptor;

/// Response header carrying the digest of the returned content.
const CONTENT_DIGEST_HEADER: &str = "docker-content-digest";

/// Why a pull failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The registry reported that the tag or content does not exist.
    NotFound,

    /// Any other failure, with its diagnostic text.
    Message(String),
}

/// Outcome of restoring one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreStatus {
    /// The artifact is in the local cache.
    Succeeded,

    /// The artifact could not be restored.
    Failed(FailureReason),
}

impl RestoreStatus {
    /// Returns true if the restore succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Result of a successful push.
#[derive(Debug, Clone)]
pub struct PushResult {
    /// Digest of the uploaded manifest.
    pub manifest_digest: String,

    /// The uploaded manifest.
    pub manifest: Manifest,
}

/// Registry I/O for OCI module artifacts.
#[async_trait]
pub trait OciArtifactClient: std::fmt::Debug + Send + Sync {
    /// Downloads the artifact of `reference` into the local cache.
    async fn pull(
        &self,
        reference: &OciArtifactModuleReference,
        cancel: &CancellationToken,
    ) -> RestoreStatus;

    /// Uploads `config` and `layers`, then the manifest referencing them.
    ///
    /// The tag is only updated by the final manifest upload.
    async fn push(
        &self,
        reference: &OciArtifactModuleReference,
        config: StreamDescriptor,
        layers: Vec<StreamDescriptor>,
        cancel: &CancellationToken,
    ) -> Result<PushResult, RegistryError>;

    /// Returns the cache directory of `reference`, without I/O.
    fn local_cache_directory(&self, reference: &OciArtifactModuleReference) -> PathBuf;

    /// Returns the entry-point path of `reference`, without I/O.
    fn local_entry_point_path(&self, reference: &OciArtifactModuleReference) -> PathBuf;

    /// Returns the file name pulls treat as the module entry point.
    fn entry_point(&self) -> &str;
}

/// HTTP client for OCI-compatible registries.
#[derive(Debug)]
pub struct RegistryClient {
    config: RegistryConfig,
    http: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
    cache: ArtifactCache,
}

impl RegistryClient {
    /// Creates a new registry client using the configured authentication.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use modreg_registry::{RegistryClient, RegistryConfig};
    ///
    /// let config = RegistryConfig::new("/tmp/artifacts");
    /// let client = RegistryClient::new(config)?;
    /// # Ok::<(), modreg_registry::RegistryError>(())
    /// ```
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        let credentials = Arc::new(config.auth.clone());
        Self::with_credentials(config, credentials)
    }

    /// Creates a new registry client with an explicit credential provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_credentials(
        config: RegistryConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, RegistryError> {
        let http = Self::build_http_client(&config)?;
        let cache = ArtifactCache::from_config(&config);

        Ok(Self {
            config,
            http,
            credentials,
            cache,
        })
    }

    /// Returns the registry configuration.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Returns the local artifact cache.
    #[must_use]
    pub const fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Resolves the tag of `reference` to a manifest digest.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the tag does not exist, or
    /// another error if the registry cannot be contacted.
    pub async fn resolve_digest(
        &self,
        reference: &OciArtifactModuleReference,
        cancel: &CancellationToken,
    ) -> Result<String, RegistryError> {
        let url = self.manifest_url(reference, reference.tag())?;
        let headers = self.headers(reference)?;

        cancellable(cancel, async {
            let response = self
                .http
                .head(url.clone())
                .headers(headers.clone())
                .header(ACCEPT, MediaType::OCI_MANIFEST)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(error_from_response(response, reference.tag()).await);
            }

            if let Some(digest) = content_digest(&response) {
                return Ok(digest);
            }

            // Some registries omit the digest header on HEAD.
            let response = self
                .http
                .get(url)
                .headers(headers)
                .header(ACCEPT, MediaType::OCI_MANIFEST)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(error_from_response(response, reference.tag()).await);
            }

            let body = response.bytes().await?;
            Ok(DigestAlgorithm::Sha256.digest(&body))
        })
        .await
    }

    /// Downloads and verifies the manifest with the given digest.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is missing, does not match its
    /// digest, or cannot be decoded.
    pub async fn fetch_manifest(
        &self,
        reference: &OciArtifactModuleReference,
        digest: &str,
        cancel: &CancellationToken,
    ) -> Result<Manifest, RegistryError> {
        let url = self.manifest_url(reference, digest)?;
        let headers = self.headers(reference)?;

        let body = cancellable(cancel, async {
            let response = self
                .http
                .get(url)
                .headers(headers)
                .header(ACCEPT, MediaType::OCI_MANIFEST)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(error_from_response(response, digest).await);
            }

            Ok(response.bytes().await?)
        })
        .await?;

        verify_digest(digest, &body)?;
        Manifest::from_slice(&body)
    }

    /// Downloads and verifies the blob described by `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob is missing or does not match the
    /// descriptor's size and digest.
    pub async fn fetch_blob(
        &self,
        reference: &OciArtifactModuleReference,
        descriptor: &Descriptor,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, RegistryError> {
        let url = self.blob_url(reference, &descriptor.digest)?;
        let headers = self.headers(reference)?;

        let data = cancellable(cancel, async {
            let response = self.http.get(url).headers(headers).send().await?;

            if !response.status().is_success() {
                return Err(error_from_response(response, &descriptor.digest).await);
            }

            Ok(response.bytes().await?.to_vec())
        })
        .await?;

        if data.len() as u64 != descriptor.size {
            return Err(RegistryError::InvalidManifest {
                message: format!(
                    "Layer {} size mismatch: expected {}, got {}",
                    descriptor.digest,
                    descriptor.size,
                    data.len()
                ),
            });
        }

        verify_digest(&descriptor.digest, &data)?;
        Ok(data)
    }

    /// Checks if a blob already exists in the repository.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be contacted.
    pub async fn blob_exists(
        &self,
        reference: &OciArtifactModuleReference,
        digest: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, RegistryError> {
        let url = self.blob_url(reference, digest)?;
        let headers = self.headers(reference)?;

        cancellable(cancel, async {
            let response = self.http.head(url).headers(headers).send().await?;
            Ok::<_, RegistryError>(response.status().is_success())
        })
        .await
    }

    /// Uploads a blob unless the repository already has it.
    async fn upload_blob(
        &self,
        reference: &OciArtifactModuleReference,
        data: Vec<u8>,
        digest: &str,
        cancel: &CancellationToken,
    ) -> Result<(), RegistryError> {
        if self.blob_exists(reference, digest, cancel).await? {
            tracing::debug!(digest, "Blob already present, skipping upload");
            return Ok(());
        }

        let base = self.config.registry_url(reference.registry())?;
        let start_url = join_url(&base, &format!("v2/{}/blobs/uploads/", reference.repository()))?;
        let headers = self.headers(reference)?;

        cancellable(cancel, async {
            // Start upload session
            let response = self
                .http
                .post(start_url)
                .headers(headers.clone())
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(RegistryError::UploadFailed {
                    message: format!("Failed to start upload: {}", response.status()),
                });
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| RegistryError::UploadFailed {
                    message: "No upload location returned".to_string(),
                })?;

            // Complete upload with PUT
            let mut upload_url = join_url(&base, location)?;
            upload_url.query_pairs_mut().append_pair("digest", digest);

            let response = self
                .http
                .put(upload_url)
                .headers(headers)
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(data)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(RegistryError::UploadFailed {
                    message: format!("Failed to upload blob {digest}: {}", response.status()),
                });
            }

            tracing::debug!(digest, "Uploaded blob");
            Ok(())
        })
        .await
    }

    /// Uploads a manifest under the reference's tag.
    async fn push_manifest(
        &self,
        reference: &OciArtifactModuleReference,
        manifest: Vec<u8>,
        digest: &str,
        cancel: &CancellationToken,
    ) -> Result<(), RegistryError> {
        let url = self.manifest_url(reference, reference.tag())?;
        let headers = self.headers(reference)?;

        cancellable(cancel, async {
            let response = self
                .http
                .put(url)
                .headers(headers)
                .header(CONTENT_TYPE, MediaType::OCI_MANIFEST)
                .body(manifest)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(RegistryError::ManifestPushFailed {
                    reference: reference.to_string(),
                    message: format!(
                        "{}: {}",
                        response.status(),
                        response.text().await.unwrap_or_default()
                    ),
                });
            }

            if let Some(returned) = content_digest(&response) {
                if returned != digest {
                    tracing::warn!(
                        expected = digest,
                        returned = %returned,
                        "Registry reported a different manifest digest"
                    );
                }
            }

            Ok(())
        })
        .await
    }

    /// Restores the artifact, propagating every failure.
    async fn try_pull(
        &self,
        reference: &OciArtifactModuleReference,
        cancel: &CancellationToken,
    ) -> Result<(), RegistryError> {
        let digest = self.resolve_digest(reference, cancel).await?;

        let directory = self.cache.module_directory(reference);
        let _guard = self.cache.lock(&directory).await;
        ArtifactCache::create_module_directory(&directory)?;

        let manifest = self.fetch_manifest(reference, &digest, cancel).await?;

        // The entry point goes last so a partial restore still reads as missing.
        let entry_point = self.cache.entry_point();
        let (entry_layers, other_layers): (Vec<_>, Vec<_>) = manifest
            .layers
            .iter()
            .partition(|layer| ArtifactCache::layer_file_name(layer) == entry_point);

        if entry_layers.is_empty() {
            return Err(RegistryError::InvalidManifest {
                message: format!("artifact has no layer titled {entry_point}"),
            });
        }

        for layer in other_layers.into_iter().chain(entry_layers) {
            let data = self.fetch_blob(reference, layer, cancel).await?;
            let file_name = ArtifactCache::layer_file_name(layer);
            ArtifactCache::write_file(&directory, &file_name, &data)?;
        }

        tracing::info!(
            reference = %reference,
            digest = %digest,
            layers = manifest.layers.len(),
            path = %directory.display(),
            "Restored module"
        );

        Ok(())
    }

    fn manifest_url(
        &self,
        reference: &OciArtifactModuleReference,
        tag_or_digest: &str,
    ) -> Result<Url, RegistryError> {
        let base = self.config.registry_url(reference.registry())?;
        join_url(
            &base,
            &format!("v2/{}/manifests/{tag_or_digest}", reference.repository()),
        )
    }

    fn blob_url(
        &self,
        reference: &OciArtifactModuleReference,
        digest: &str,
    ) -> Result<Url, RegistryError> {
        let base = self.config.registry_url(reference.registry())?;
        join_url(
            &base,
            &format!("v2/{}/blobs/{digest}", reference.repository()),
        )
    }

    /// Builds the HTTP client with proper configuration.
    fn build_http_client(config: &RegistryConfig) -> Result<reqwest::Client, RegistryError> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent);

        // Configure TLS if provided
        if let Some(ref tls) = config.tls {
            if tls.insecure_skip_verify {
                builder = builder.danger_accept_invalid_certs(true);
            }

            if let Some(ref ca_cert) = tls.ca_cert {
                let cert_pem = std::fs::read(ca_cert).map_err(|e| RegistryError::IoError {
                    path: ca_cert.clone(),
                    source: e,
                })?;
                let cert = reqwest::Certificate::from_pem(&cert_pem).map_err(|e| {
                    RegistryError::AuthenticationFailed {
                        message: format!("Invalid CA certificate: {e}"),
                    }
                })?;
                builder = builder.add_root_certificate(cert);
            }

            if let (Some(ref cert_path), Some(ref key_path)) = (&tls.client_cert, &tls.client_key)
            {
                let mut cert_pem = std::fs::read(cert_path).map_err(|e| RegistryError::IoError {
                    path: cert_path.clone(),
                    source: e,
                })?;
                let key_pem = std::fs::read(key_path).map_err(|e| RegistryError::IoError {
                    path: key_path.clone(),
                    source: e,
                })?;
                cert_pem.extend_from_slice(&key_pem);

                let identity = reqwest::Identity::from_pem(&cert_pem).map_err(|e| {
                    RegistryError::AuthenticationFailed {
                        message: format!("Invalid client certificate: {e}"),
                    }
                })?;
                builder = builder.identity(identity);
            }
        }

        builder.build().map_err(|e| RegistryError::HttpError {
            status: 0,
            message: format!("Failed to build HTTP client: {e}"),
        })
    }

    /// Creates authentication headers for the reference's registry.
    fn headers(&self, reference: &OciArtifactModuleReference) -> Result<HeaderMap, RegistryError> {
        let mut headers = HeaderMap::new();
        if let Some(value) = self.credentials.authorization(reference.registry())? {
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl OciArtifactClient for RegistryClient {
    async fn pull(
        &self,
        reference: &OciArtifactModuleReference,
        cancel: &CancellationToken,
    ) -> RestoreStatus {
        match self.try_pull(reference, cancel).await {
            Ok(()) => RestoreStatus::Succeeded,
            Err(e) if e.is_not_found() => RestoreStatus::Failed(FailureReason::NotFound),
            // our own storage errors carry a message fit for users
            Err(e @ RegistryError::LocalStorage { .. }) => {
                RestoreStatus::Failed(FailureReason::Message(e.to_string()))
            }
            Err(e) => RestoreStatus::Failed(FailureReason::Message(format!(
                "Unhandled exception: {}",
                error_chain(&e)
            ))),
        }
    }

    async fn push(
        &self,
        reference: &OciArtifactModuleReference,
        mut config: StreamDescriptor,
        layers: Vec<StreamDescriptor>,
        cancel: &CancellationToken,
    ) -> Result<PushResult, RegistryError> {
        let algorithm = DigestAlgorithm::Sha256;

        let config_descriptor = config.descriptor(algorithm)?;
        let config_data = config.read_all()?;
        verify_digest(&config_descriptor.digest, &config_data)?;
        self.upload_blob(reference, config_data, &config_descriptor.digest, cancel)
            .await?;

        let mut layer_descriptors = Vec::with_capacity(layers.len());
        for mut layer in layers {
            let layer_descriptor = layer.descriptor(algorithm)?;
            let layer_data = layer.read_all()?;
            verify_digest(&layer_descriptor.digest, &layer_data)?;
            self.upload_blob(reference, layer_data, &layer_descriptor.digest, cancel)
                .await?;
            layer_descriptors.push(layer_descriptor);
        }

        let manifest = Manifest::new(config_descriptor, layer_descriptors);
        let manifest_bytes = manifest.to_bytes()?;
        let manifest_digest = algorithm.digest(&manifest_bytes);

        self.push_manifest(reference, manifest_bytes, &manifest_digest, cancel)
            .await?;

        tracing::info!(
            reference = %reference,
            digest = %manifest_digest,
            layers = manifest.layers.len(),
            "Published module"
        );

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

/// Runs `future` unless `cancel` fires first.
async fn cancellable<T, F>(cancel: &CancellationToken, future: F) -> Result<T, RegistryError>
where
    F: Future<Output = Result<T, RegistryError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(RegistryError::Cancelled),
        result = future => result,
    }
}

/// Converts an unsuccessful response into an error.
async fn error_from_response(response: Response, requested: &str) -> RegistryError {
    let status = response.status();
    match status {
        StatusCode::NOT_FOUND => RegistryError::NotFound {
            reference: requested.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RegistryError::AuthenticationFailed {
            message: format!("{status} while requesting {requested}"),
        },
        _ => {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map_or(body, |errors| errors.summary());
            RegistryError::HttpError {
                status: status.as_u16(),
                message,
            }
        }
    }
}

fn content_digest(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_DIGEST_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

fn join_url(base: &Url, path: &str) -> Result<Url, RegistryError> {
    base.join(path).map_err(|_| RegistryError::InvalidUrl {
        url: format!("{base}{path}"),
    })
}

/// Renders an error followed by its sources.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
