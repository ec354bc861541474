//! The `IamRole` custom resource: the persisted desired-state record.

use std::collections::BTreeMap;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::{RoleDefinition, Statement};

/// Finalizer guarding remote cleanup of the role backing an `IamRole`.
pub const ROLE_FINALIZER: &str = "iamrole.iam.roleoperator.io/finalizer";

/// Error text written to status after a successful reconcile.
pub const NO_ERROR: &str = "<none>";

/// Desired state of an IAM role assumable by Kubernetes service accounts
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "iam.roleoperator.io",
    version = "v1beta1",
    kind = "IamRole",
    plural = "iamroles",
    shortname = "iamrole",
    namespaced,
    status = "IamRoleStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Error","type":"string","jsonPath":".status.error"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IamRoleSpec {
    /// Service account names allowed to assume the role
    pub service_accounts: Vec<String>,
    /// Namespace of those service accounts
    pub namespace: String,
    /// Inline policy statements, grouped by inline policy
    pub statements: BTreeMap<String, Vec<StatementSpec>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct StatementSpec {
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum SyncState {
    #[default]
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IamRoleStatus {
    pub state: SyncState,
    pub error: String,
    pub observed_generation: i64,
}

impl IamRole {
    /// Snapshot the resource into the engine's storage-agnostic model.
    pub fn to_definition(&self) -> RoleDefinition {
        let statements = self
            .spec
            .statements
            .iter()
            .map(|(group, specs)| {
                let statements = specs
                    .iter()
                    .map(|s| Statement::new(s.actions.iter().cloned(), s.resources.iter().cloned()))
                    .collect();
                (group.clone(), statements)
            })
            .collect();

        RoleDefinition {
            name: self.name_any(),
            record_namespace: self.namespace().unwrap_or_default(),
            service_accounts: self.spec.service_accounts.clone(),
            namespace: self.spec.namespace.clone(),
            statements,
            generation: self.metadata.generation.unwrap_or_default(),
            deletion_requested: self.metadata.deletion_timestamp.is_some(),
            has_finalizer: self.finalizers().iter().any(|f| f == ROLE_FINALIZER),
            observed_generation: self
                .status
                .as_ref()
                .map_or(0, |status| status.observed_generation),
            resource_version: self.resource_version(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::CustomResourceExt;
    use serde_json::json;

    fn sample_role() -> IamRole {
        let mut role = IamRole::new(
            "billing",
            IamRoleSpec {
                service_accounts: vec!["api".to_string()],
                namespace: "payments".to_string(),
                statements: BTreeMap::from([(
                    "s3".to_string(),
                    vec![StatementSpec {
                        actions: vec!["s3:GetObject".to_string(), "s3:GetObject".to_string()],
                        resources: vec!["arn:aws:s3:::invoices/*".to_string()],
                    }],
                )]),
            },
        );
        role.metadata.namespace = Some("team-payments".to_string());
        role.metadata.generation = Some(4);
        role
    }

    #[test]
    fn test_spec_deserializes_from_manifest_shape() {
        let spec: IamRoleSpec = serde_json::from_value(json!({
            "serviceAccounts": ["api"],
            "namespace": "payments",
            "statements": {
                "s3": [{"actions": ["s3:GetObject"], "resources": ["*"]}]
            }
        }))
        .unwrap();
        assert_eq!(spec.service_accounts, vec!["api"]);
        assert_eq!(spec.statements["s3"][0].resources, vec!["*"]);
    }

    #[test]
    fn test_status_serializes_state_tokens() {
        let status = IamRoleStatus {
            state: SyncState::Error,
            error: "boom".to_string(),
            observed_generation: 3,
        };
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({"state": "ERROR", "error": "boom", "observedGeneration": 3})
        );
    }

    #[test]
    fn test_definition_from_fresh_resource() {
        let def = sample_role().to_definition();
        assert_eq!(def.name, "billing");
        assert_eq!(def.record_namespace, "team-payments");
        assert_eq!(def.namespace, "payments");
        assert_eq!(def.generation, 4);
        assert_eq!(def.observed_generation, 0);
        assert_eq!(def.resource_version, None);
        assert!(!def.has_finalizer);
        assert!(!def.deletion_requested);
        assert_eq!(def.statements["s3"][0].actions.len(), 1);
    }

    #[test]
    fn test_definition_tracks_finalizer_deletion_and_status() {
        let mut role = sample_role();
        role.metadata.finalizers = Some(vec![
            "other.io/finalizer".to_string(),
            ROLE_FINALIZER.to_string(),
        ]);
        role.metadata.deletion_timestamp = Some(Time(Default::default()));
        role.status = Some(IamRoleStatus {
            state: SyncState::Ok,
            error: NO_ERROR.to_string(),
            observed_generation: 3,
        });
        role.metadata.resource_version = Some("1187".to_string());

        let def = role.to_definition();
        assert!(def.has_finalizer);
        assert!(def.deletion_requested);
        assert_eq!(def.observed_generation, 3);
        assert_eq!(def.resource_version.as_deref(), Some("1187"));
    }

    #[test]
    fn test_crd_identity() {
        let crd = IamRole::crd();
        assert_eq!(crd.spec.group, "iam.roleoperator.io");
        assert_eq!(crd.spec.names.kind, "IamRole");
        assert_eq!(crd.spec.names.plural, "iamroles");
        assert_eq!(crd.spec.scope, "Namespaced");
    }
}
