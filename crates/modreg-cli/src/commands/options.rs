//! Registry options shared by all commands.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;

use modreg_registry::{CacheLayout, RegistryAuth, RegistryConfig, TlsConfig};

/// Registry connection and cache options.
#[derive(Args, Debug, Clone, Default)]
pub struct RegistryOptions {
    /// Root directory of the local module cache [default: ~/.modreg/artifacts]
    #[arg(long, env = "MODREG_CACHE_ROOT")]
    pub cache_root: Option<PathBuf>,

    /// Name cache directories after a digest of the reference
    #[arg(long)]
    pub hashed_cache: bool,

    /// Bearer token for authentication
    #[arg(long, env = "MODREG_REGISTRY_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Username for basic authentication
    #[arg(short, long, env = "MODREG_REGISTRY_USERNAME")]
    pub username: Option<String>,

    /// Password for basic authentication
    #[arg(long, env = "MODREG_REGISTRY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Use plain HTTP instead of HTTPS
    #[arg(long)]
    pub plain_http: bool,

    /// CA certificate (PEM) trusted for registry connections
    #[arg(long, env = "MODREG_CA_CERT")]
    pub ca_cert: Option<PathBuf>,

    /// Client certificate (PEM) for mTLS
    #[arg(long, requires = "client_key")]
    pub client_cert: Option<PathBuf>,

    /// Client private key (PEM) for mTLS
    #[arg(long, requires = "client_cert")]
    pub client_key: Option<PathBuf>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, default_value = "60")]
    pub timeout: u64,

    /// Number of modules restored at the same time
    #[arg(long, default_value = "1")]
    pub concurrency: usize,
}

impl RegistryOptions {
    /// Builds the registry configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the authentication options are incomplete.
    pub fn config(&self) -> Result<RegistryConfig> {
        let mut config = match self.cache_root {
            Some(ref root) => RegistryConfig::new(root),
            None => RegistryConfig::default(),
        };

        if self.hashed_cache {
            config = config.with_cache_layout(CacheLayout::Hashed);
        }

        if let Some(tls) = self.tls() {
            config = config.with_tls(tls);
        }

        Ok(config
            .with_auth(self.determine_auth()?)
            .with_timeout(Duration::from_secs(self.timeout))
            .with_plain_http(self.plain_http)
            .with_max_concurrent_restores(self.concurrency))
    }

    /// Builds the TLS settings, if any TLS option was given.
    fn tls(&self) -> Option<TlsConfig> {
        if self.ca_cert.is_none() && self.client_cert.is_none() && !self.insecure {
            return None;
        }

        let mut tls = TlsConfig::new();
        if let Some(ref ca_cert) = self.ca_cert {
            tls = tls.with_ca_cert(ca_cert);
        }
        if let (Some(ref cert), Some(ref key)) = (&self.client_cert, &self.client_key) {
            tls = tls.with_client_cert(cert, key);
        }
        if self.insecure {
            tls = tls.insecure();
        }
        Some(tls)
    }

    /// Determines the authentication method from CLI arguments.
    fn determine_auth(&self) -> Result<RegistryAuth> {
        if let Some(ref token) = self.token {
            return Ok(RegistryAuth::Bearer {
                token: token.clone(),
            });
        }

        if let (Some(ref username), Some(ref password)) = (&self.username, &self.password) {
            return Ok(RegistryAuth::Basic {
                username: username.clone(),
                password: password.clone(),
            });
        }

        if self.username.is_some() || self.password.is_some() {
            anyhow::bail!("Both --username and --password are required for basic authentication");
        }

        // No auth - useful for local registries
        Ok(RegistryAuth::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> RegistryOptions {
        RegistryOptions {
            timeout: 60,
            concurrency: 1,
            ..RegistryOptions::default()
        }
    }

    #[test]
    fn test_determine_auth_none() {
        let auth = options().determine_auth().unwrap();
        assert!(matches!(auth, RegistryAuth::None));
    }

    #[test]
    fn test_determine_auth_bearer() {
        let args = RegistryOptions {
            token: Some("test-token".to_string()),
            ..options()
        };

        match args.determine_auth().unwrap() {
            RegistryAuth::Bearer { token } => assert_eq!(token, "test-token"),
            _ => panic!("Expected Bearer auth"),
        }
    }

    #[test]
    fn test_determine_auth_basic() {
        let args = RegistryOptions {
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            ..options()
        };

        match args.determine_auth().unwrap() {
            RegistryAuth::Basic { username, password } => {
                assert_eq!(username, "user");
                assert_eq!(password, "pass");
            }
            _ => panic!("Expected Basic auth"),
        }
    }

    #[test]
    fn test_determine_auth_incomplete_basic() {
        let args = RegistryOptions {
            username: Some("user".to_string()),
            ..options()
        };

        assert!(args.determine_auth().is_err());
    }

    #[test]
    fn test_determine_auth_bearer_takes_precedence() {
        let args = RegistryOptions {
            token: Some("bearer-token".to_string()),
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            ..options()
        };

        assert!(matches!(
            args.determine_auth().unwrap(),
            RegistryAuth::Bearer { .. }
        ));
    }

    #[test]
    fn test_config() {
        let args = RegistryOptions {
            cache_root: Some(PathBuf::from("/cache")),
            hashed_cache: true,
            plain_http: true,
            timeout: 5,
            concurrency: 0,
            ..options()
        };

        let config = args.config().unwrap();
        assert_eq!(config.cache_root, PathBuf::from("/cache"));
        assert_eq!(config.cache_layout, CacheLayout::Hashed);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_concurrent_restores, 1);
        assert!(config.plain_http);
        assert!(config.tls.is_none());
    }

    #[test]
    fn test_config_tls() {
        let args = RegistryOptions {
            ca_cert: Some(PathBuf::from("/certs/ca.pem")),
            client_cert: Some(PathBuf::from("/certs/client.pem")),
            client_key: Some(PathBuf::from("/certs/client.key")),
            insecure: true,
            ..options()
        };

        let tls = args.config().unwrap().tls.unwrap();
        assert_eq!(tls.ca_cert, Some(PathBuf::from("/certs/ca.pem")));
        assert_eq!(tls.client_cert, Some(PathBuf::from("/certs/client.pem")));
        assert_eq!(tls.client_key, Some(PathBuf::from("/certs/client.key")));
        assert!(tls.insecure_skip_verify);
    }
}
