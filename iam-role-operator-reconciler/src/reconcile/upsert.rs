//! Converging and tearing down a remote role.
//!
//! Every step is idempotent on its own, so a protocol that fails half-way is
//! simply re-run from the top on the next trigger. Nothing is rolled back.

use std::collections::{BTreeMap, BTreeSet};

use log::{info, warn};

use crate::aws::{RemoteRoleStore, ROLE_OWNER_TAG};
use crate::error::{ReconcileError, ReconcileResult};

/// Encoded documents a remote role should converge to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredRole {
    pub role_name: String,
    pub trust_policy: String,
    /// Inline policy name → JSON document.
    pub inline_policies: BTreeMap<String, String>,
}

/// What an upsert changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub created: bool,
    pub put: Vec<String>,
    pub deleted: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// No remote role existed.
    AlreadyAbsent,
    /// The role and these inline policies were deleted.
    Deleted { policies: Vec<String> },
    /// A role of that name exists but is not ours; it was left untouched.
    NotOwned,
}

/// Inline policies attached remotely that are no longer desired.
pub fn policies_to_delete(
    current: &BTreeSet<String>,
    desired: &BTreeMap<String, String>,
) -> BTreeSet<String> {
    let desired: BTreeSet<String> = desired.keys().cloned().collect();
    current.difference(&desired).cloned().collect()
}

/// Create or update the role so it matches `desired`.
///
/// An existing role without the ownership tag is refused before any
/// mutating call is made.
pub async fn upsert<S>(store: &S, desired: &DesiredRole) -> ReconcileResult<UpsertReport>
where
    S: RemoteRoleStore + ?Sized,
{
    let role_name = desired.role_name.as_str();
    let mut report = UpsertReport::default();

    let current = match store.find(role_name).await? {
        None => {
            store.create(role_name, &desired.trust_policy).await?;
            report.created = true;
            BTreeSet::new()
        }
        Some(role) if !role.owned => {
            return Err(ReconcileError::OwnershipDenied {
                role: role.name,
                tag: ROLE_OWNER_TAG.to_string(),
            });
        }
        Some(_) => store.list_inline_policy_names(role_name).await?,
    };

    let stale = policies_to_delete(&current, &desired.inline_policies);

    store
        .update_trust_policy(role_name, &desired.trust_policy)
        .await?;

    for (policy_name, document) in &desired.inline_policies {
        store.put(role_name, policy_name, document).await?;
        report.put.push(policy_name.clone());
    }

    for policy_name in stale {
        store.delete(role_name, &policy_name).await?;
        report.deleted.push(policy_name);
    }

    Ok(report)
}

/// Delete the role and all of its inline policies.
///
/// A missing role counts as success. A role without the ownership tag is
/// never deleted.
pub async fn teardown<S>(store: &S, role_name: &str) -> ReconcileResult<TeardownOutcome>
where
    S: RemoteRoleStore + ?Sized,
{
    match store.find(role_name).await? {
        None => {
            info!("IAM role {role_name} already gone");
            Ok(TeardownOutcome::AlreadyAbsent)
        }
        Some(role) if !role.owned => {
            warn!(
                "IAM role {role_name} is missing the {ROLE_OWNER_TAG} tag; leaving it in place"
            );
            Ok(TeardownOutcome::NotOwned)
        }
        Some(_) => {
            let mut policies = Vec::new();
            for policy_name in store.list_inline_policy_names(role_name).await? {
                store.delete(role_name, &policy_name).await?;
                policies.push(policy_name);
            }
            store.delete_role(role_name).await?;
            Ok(TeardownOutcome::Deleted { policies })
        }
    }
}
