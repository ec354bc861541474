//! This crate provides the core logic for the IAM Role Operator:
//! - Trust and inline policy synthesis for OIDC-federated service accounts
//! - Ownership-guarded IAM role operations
//! - The finalizer-driven reconcile engine and its Kubernetes adapters
//!

pub mod aws;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod kube_store;
pub mod reconcile;
pub mod synthesis;
pub mod types;

// Re-exports for a small, focused public API
pub use aws::iam_client::AwsIamRoleStore;
pub use aws::{AwsError, RemoteRole, RemoteRoleStore};
pub use config::{ConfigError, OperatorConfig};
pub use crd::{IamRole, IamRoleSpec, IamRoleStatus, SyncState};
pub use error::{ReconcileError, ReconcileResult};
pub use reconcile::{desired_role, DesiredRole, ReconcileEngine, ReconcileOutcome};
pub use synthesis::{build_inline_policies, build_trust_policy};
pub use types::{PolicyDocument, RoleDefinition, Statement};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trust_policy_for_sample_service_account() {
        let doc = build_trust_policy(
            &["svc-a".to_string()],
            "ns1",
            "https://oidc.example.com/id/X",
            "arn:aws:iam::1:oidc-provider/oidc.example.com/id/X",
        );
        let json = doc.to_json().expect("should encode");
        assert!(json.contains(r#""oidc.example.com/id/X:sub":["system:serviceaccount:ns1:svc-a"]"#));
        assert!(json.contains(r#""Action":"sts:AssumeRoleWithWebIdentity""#));
    }
}
