//! IAM policy document types and the desired-state model the engine works on.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::ReconcileResult;

pub const POLICY_VERSION: &str = "2012-10-17";

/// A JSON value that IAM accepts either as a single string or a list.
///
/// Singleton sets are emitted as a scalar so that documents match IAM's own
/// canonical form and do not show up as spurious diffs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    Single(String),
    Multiple(Vec<String>),
}

impl OneOrMany {
    pub fn from_set(values: &BTreeSet<String>) -> Self {
        match values.len() {
            1 => values
                .iter()
                .next()
                .map_or_else(|| Self::Multiple(Vec::new()), |v| Self::Single(v.clone())),
            _ => Self::Multiple(values.iter().cloned().collect()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
}

/// Condition operator → condition key → accepted values.
pub type ConditionBlock = BTreeMap<String, BTreeMap<String, Vec<String>>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub effect: Effect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<BTreeMap<String, String>>,
    pub action: OneOrMany,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new(statement: Vec<PolicyStatement>) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement,
        }
    }

    /// Serialize to the compact JSON string sent to IAM.
    pub fn to_json(&self) -> ReconcileResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// One permission grant: every action allowed on every resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statement {
    pub actions: BTreeSet<String>,
    pub resources: BTreeSet<String>,
}

impl Statement {
    pub fn new<A, R>(actions: A, resources: R) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            actions: actions.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
        }
    }
}

/// Desired state of one managed role, decoupled from its storage format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleDefinition {
    pub name: String,
    /// Namespace the record itself lives in.
    pub record_namespace: String,
    pub service_accounts: Vec<String>,
    /// Namespace of the service accounts allowed to assume the role.
    pub namespace: String,
    pub statements: BTreeMap<String, Vec<Statement>>,
    pub generation: i64,
    pub deletion_requested: bool,
    pub has_finalizer: bool,
    /// Generation recorded by the last successful reconcile.
    pub observed_generation: i64,
    /// Version of the record this snapshot was taken from.
    pub resource_version: Option<String>,
}
