//! AWS SDK integration: the remote role store abstraction, its IAM-backed
//! implementation, and resource naming.

pub mod iam_client;
pub mod policy_naming;

use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;

/// Tag key marking a role as created and owned by this operator.
pub const ROLE_OWNER_TAG: &str = "iam.roleoperator.io/managed";

/// Value written alongside [`ROLE_OWNER_TAG`] on creation. Only the key is
/// checked when deciding ownership.
pub const ROLE_OWNER_TAG_VALUE: &str = "true";

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("AWS configuration error: {0}")]
    ConfigError(String),
    #[error("IAM {operation} failed for role '{role}': {message}")]
    Iam {
        operation: &'static str,
        role: String,
        message: String,
    },
}

impl AwsError {
    pub fn iam(operation: &'static str, role: &str, message: impl Into<String>) -> Self {
        Self::Iam {
            operation,
            role: role.to_string(),
            message: message.into(),
        }
    }
}

pub type AwsResult<T> = Result<T, AwsError>;

/// A role as currently seen in IAM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRole {
    pub name: String,
    /// Whether the role carries [`ROLE_OWNER_TAG`].
    pub owned: bool,
}

/// Operations the reconcile engine needs from the remote IAM API.
///
/// Implementations must not enforce ownership themselves; the engine checks
/// [`RemoteRole::owned`] before issuing any mutating call on an existing role.
#[async_trait]
pub trait RemoteRoleStore: Send + Sync {
    /// Look up a role by name. `Ok(None)` means the role does not exist.
    async fn find(&self, role_name: &str) -> AwsResult<Option<RemoteRole>>;

    /// Create a role with the given trust policy, tagged as owned.
    async fn create(&self, role_name: &str, trust_policy: &str) -> AwsResult<()>;

    /// Overwrite the role's trust policy.
    async fn update_trust_policy(&self, role_name: &str, trust_policy: &str) -> AwsResult<()>;

    async fn list_inline_policy_names(&self, role_name: &str) -> AwsResult<BTreeSet<String>>;

    /// Create or replace an inline policy.
    async fn put(&self, role_name: &str, policy_name: &str, document: &str) -> AwsResult<()>;

    /// Delete an inline policy. Deleting an absent policy succeeds.
    async fn delete(&self, role_name: &str, policy_name: &str) -> AwsResult<()>;

    /// Delete the role itself. Deleting an absent role succeeds.
    async fn delete_role(&self, role_name: &str) -> AwsResult<()>;
}
