//! Server configuration
//!
//! Read once at start-up from `ACA_*` environment variables. Only the peer
//! root certificates are required; everything else has a default.

use aca_core::KeyPair;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

use crate::ca::{AuthorityName, CaError, LocalAuthority};
use crate::issuance::{MatchPolicy, DEFAULT_CERT_VALIDITY};
use crate::source::{AttributeSource, FileAttributeSource, StaticAttributeSource};

/// Common name of the authority's self-signed certificate
pub const AUTHORITY_COMMON_NAME: &str = "ACA";

pub const DEFAULT_PORT: u16 = 7054;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("Failed to read {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error(transparent)]
    Authority(#[from] CaError),
}

/// Attribute authority configuration
#[derive(Debug, Clone)]
pub struct AcaConfig {
    pub port: u16,
    pub log_level: Level,
    pub key_id: String,
    /// PKCS#8 PEM of the authority key; a key is generated when unset
    pub key_path: Option<PathBuf>,
    pub eca_cert_path: PathBuf,
    pub tca_cert_path: PathBuf,
    /// TOML attribute feed; the source is empty when unset
    pub attributes_path: Option<PathBuf>,
    pub cert_validity: Duration,
    pub match_policy: MatchPolicy,
    pub database_url: Option<String>,
}

impl AcaConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("ACA_PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                var: "ACA_PORT",
                reason: format!("'{}' is not a valid port number", raw),
            })?,
            None => DEFAULT_PORT,
        };

        let log_level = lookup("ACA_LOG_LEVEL")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(Level::INFO);

        let key_id = lookup("ACA_KEY_ID").unwrap_or_else(|| format!("aca-{}", uuid::Uuid::new_v4()));

        let cert_validity = match lookup("ACA_CERT_VALIDITY_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| ConfigError::Invalid {
                    var: "ACA_CERT_VALIDITY_SECS",
                    reason: format!("'{}' is not a positive number of seconds", raw),
                })?,
            None => DEFAULT_CERT_VALIDITY,
        };

        let match_policy = match lookup("ACA_MATCH_POLICY") {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                var: "ACA_MATCH_POLICY",
                reason,
            })?,
            None => MatchPolicy::default(),
        };

        Ok(Self {
            port,
            log_level,
            key_id,
            key_path: lookup("ACA_KEY_PATH").map(PathBuf::from),
            eca_cert_path: lookup("ACA_ECA_CERT_PATH")
                .map(PathBuf::from)
                .ok_or(ConfigError::Missing("ACA_ECA_CERT_PATH"))?,
            tca_cert_path: lookup("ACA_TCA_CERT_PATH")
                .map(PathBuf::from)
                .ok_or(ConfigError::Missing("ACA_TCA_CERT_PATH"))?,
            attributes_path: lookup("ACA_ATTRIBUTES_PATH").map(PathBuf::from),
            cert_validity,
            match_policy,
            database_url: lookup("ACA_DATABASE_URL"),
        })
    }

    /// Load or generate the authority key and register the peer roots
    pub fn build_authority(&self) -> Result<LocalAuthority, ConfigError> {
        let key = match &self.key_path {
            Some(path) => {
                let pem = read(path)?;
                KeyPair::from_pkcs8_pem(&self.key_id, &pem).map_err(|e| ConfigError::Invalid {
                    var: "ACA_KEY_PATH",
                    reason: e.to_string(),
                })?
            }
            None => {
                info!(kid = %self.key_id, "No ACA_KEY_PATH set, generating authority key");
                KeyPair::generate(&self.key_id)
            }
        };

        let authority = LocalAuthority::self_signed(key, AUTHORITY_COMMON_NAME)?
            .with_peer_pem(AuthorityName::Eca, &read(&self.eca_cert_path)?)?
            .with_peer_pem(AuthorityName::Tca, &read(&self.tca_cert_path)?)?;
        Ok(authority)
    }

    /// Attribute feed selected by `ACA_ATTRIBUTES_PATH`
    pub fn attribute_source(&self) -> Arc<dyn AttributeSource> {
        match &self.attributes_path {
            Some(path) => Arc::new(FileAttributeSource::new(path)),
            None => Arc::new(StaticAttributeSource::empty()),
        }
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
