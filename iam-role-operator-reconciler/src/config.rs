//! Operator configuration: naming affixes, OIDC provider and AWS target.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aws::policy_naming::NameAffixes;

pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("<config> {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcConfig {
    #[serde(rename = "issuerURL")]
    pub issuer_url: String,
    #[serde(rename = "providerArn")]
    pub provider_arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorConfig {
    #[serde(default)]
    pub role_name: NameAffixes,
    #[serde(default)]
    pub inline_policy_name: NameAffixes,
    #[serde(default)]
    pub oidc: OidcConfig,
    /// AWS region for the IAM client; falls back to the SDK's resolution.
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_reconcile_timeout_secs")]
    pub reconcile_timeout_seconds: u64,
}

fn default_reconcile_timeout_secs() -> u64 {
    DEFAULT_RECONCILE_TIMEOUT_SECS
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            role_name: NameAffixes::default(),
            inline_policy_name: NameAffixes::default(),
            oidc: OidcConfig::default(),
            region: None,
            reconcile_timeout_seconds: DEFAULT_RECONCILE_TIMEOUT_SECS,
        }
    }
}

impl OperatorConfig {
    /// Load and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.oidc.provider_arn.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "oidc.providerArn must be set".to_string(),
            ));
        }
        if self.oidc.issuer_url.trim().is_empty() {
            return Err(ConfigError::Invalid("oidc.issuerURL must be set".to_string()));
        }
        if self.reconcile_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "reconcileTimeoutSeconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_seconds)
    }
}
