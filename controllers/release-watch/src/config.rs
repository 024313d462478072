//! Controller configuration.
//!
//! Read once from the environment at start-up.

use crate::error::ControllerError;
use dependent_watch::KindKey;
use std::env;
use std::path::PathBuf;

/// Default lower bound of the resolve retry backoff, in seconds
pub const DEFAULT_RESOLVE_RETRY_MIN_SECONDS: u64 = 1;
/// Default upper bound of the resolve retry backoff, in seconds
pub const DEFAULT_RESOLVE_RETRY_MAX_SECONDS: u64 = 60;

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// File holding the rendered release manifest
    pub manifest_path: PathBuf,
    /// `apiVersion` of the owner custom resource
    pub owner_api_version: String,
    /// `kind` of the owner custom resource
    pub owner_kind: String,
    /// Name of the owner custom resource
    pub owner_name: String,
    /// Namespace of the owner; empty for cluster-scoped owners
    pub owner_namespace: String,
    /// First retry delay while a kind is unknown to discovery
    pub resolve_retry_min_seconds: u64,
    /// Largest retry delay while a kind is unknown to discovery
    pub resolve_retry_max_seconds: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let required = |name: &str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| ControllerError::InvalidConfig(format!("{name} environment variable is required")))
        };
        let seconds = |name: &str, default: u64| match lookup(name) {
            Some(value) => value.parse::<u64>().map_err(|e| {
                ControllerError::InvalidConfig(format!("{name} must be a whole number of seconds, got {value:?}: {e}"))
            }),
            None => Ok(default),
        };

        let config = Self {
            manifest_path: PathBuf::from(required("MANIFEST_PATH")?),
            owner_api_version: required("OWNER_API_VERSION")?,
            owner_kind: required("OWNER_KIND")?,
            owner_name: required("OWNER_NAME")?,
            owner_namespace: lookup("OWNER_NAMESPACE").unwrap_or_default(),
            resolve_retry_min_seconds: seconds("RESOLVE_RETRY_MIN_SECONDS", DEFAULT_RESOLVE_RETRY_MIN_SECONDS)?,
            resolve_retry_max_seconds: seconds("RESOLVE_RETRY_MAX_SECONDS", DEFAULT_RESOLVE_RETRY_MAX_SECONDS)?,
        };

        if config.resolve_retry_min_seconds == 0 {
            return Err(ControllerError::InvalidConfig(
                "RESOLVE_RETRY_MIN_SECONDS must be at least 1".to_string(),
            ));
        }
        if config.resolve_retry_max_seconds < config.resolve_retry_min_seconds {
            return Err(ControllerError::InvalidConfig(format!(
                "RESOLVE_RETRY_MAX_SECONDS ({}) is below RESOLVE_RETRY_MIN_SECONDS ({})",
                config.resolve_retry_max_seconds, config.resolve_retry_min_seconds
            )));
        }
        Ok(config)
    }

    /// Group/version/kind of the owner
    #[must_use]
    pub fn owner_key(&self) -> KindKey {
        KindKey::from_api_version(&self.owner_api_version, &self.owner_kind)
    }
}
