//! In-memory stand-ins for IAM and the record store, sharing one call log so
//! tests can assert on cross-store ordering.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::aws::{AwsError, AwsResult, RemoteRole, RemoteRoleStore};
use crate::crd::IamRoleStatus;
use crate::error::{ReconcileError, ReconcileResult};
use crate::reconcile::status::{RecordRef, RecordStore};

pub(crate) type CallLog = Arc<Mutex<Vec<String>>>;

const READ_ONLY_CALLS: [&str; 2] = ["find", "list"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FakeRole {
    pub owned: bool,
    pub trust_policy: String,
    pub policies: BTreeMap<String, String>,
}

#[derive(Default)]
pub(crate) struct FakeRoleStore {
    roles: Mutex<BTreeMap<String, FakeRole>>,
    failures: Mutex<BTreeSet<&'static str>>,
    delay: Option<Duration>,
    log: CallLog,
}

impl FakeRoleStore {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Every call sleeps this long first, to exercise deadlines.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn seed_role(&self, name: &str, owned: bool, policies: &[&str]) {
        let role = FakeRole {
            owned,
            trust_policy: "{}".to_string(),
            policies: policies
                .iter()
                .map(|p| (p.to_string(), "{}".to_string()))
                .collect(),
        };
        self.roles.lock().unwrap().insert(name.to_string(), role);
    }

    pub fn fail_on(&self, operation: &'static str) {
        self.failures.lock().unwrap().insert(operation);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn role(&self, name: &str) -> Option<FakeRole> {
        self.roles.lock().unwrap().get(name).cloned()
    }

    pub fn policy_names(&self, name: &str) -> BTreeSet<String> {
        self.role(name)
            .map(|role| role.policies.into_keys().collect())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| {
                let op = call.split(':').next().unwrap_or_default();
                !READ_ONLY_CALLS.contains(&op) && is_store_call(op)
            })
            .collect()
    }

    pub fn reset_calls(&self) {
        self.log.lock().unwrap().clear();
    }

    async fn enter(&self, operation: &'static str, target: String) -> AwsResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.log.lock().unwrap().push(format!("{operation}:{target}"));
        if self.failures.lock().unwrap().contains(operation) {
            return Err(AwsError::iam(operation, &target, "injected failure"));
        }
        Ok(())
    }
}

fn is_store_call(op: &str) -> bool {
    matches!(
        op,
        "find" | "create" | "update_trust_policy" | "list" | "put" | "delete" | "delete_role"
    )
}

#[async_trait]
impl RemoteRoleStore for FakeRoleStore {
    async fn find(&self, role_name: &str) -> AwsResult<Option<RemoteRole>> {
        self.enter("find", role_name.to_string()).await?;
        Ok(self.role(role_name).map(|role| RemoteRole {
            name: role_name.to_string(),
            owned: role.owned,
        }))
    }

    async fn create(&self, role_name: &str, trust_policy: &str) -> AwsResult<()> {
        self.enter("create", role_name.to_string()).await?;
        let mut roles = self.roles.lock().unwrap();
        if roles.contains_key(role_name) {
            return Err(AwsError::iam("create", role_name, "EntityAlreadyExists"));
        }
        roles.insert(
            role_name.to_string(),
            FakeRole {
                owned: true,
                trust_policy: trust_policy.to_string(),
                policies: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn update_trust_policy(&self, role_name: &str, trust_policy: &str) -> AwsResult<()> {
        self.enter("update_trust_policy", role_name.to_string()).await?;
        let mut roles = self.roles.lock().unwrap();
        let role = roles
            .get_mut(role_name)
            .ok_or_else(|| AwsError::iam("update_trust_policy", role_name, "NoSuchEntity"))?;
        role.trust_policy = trust_policy.to_string();
        Ok(())
    }

    async fn list_inline_policy_names(&self, role_name: &str) -> AwsResult<BTreeSet<String>> {
        self.enter("list", role_name.to_string()).await?;
        self.role(role_name)
            .map(|role| role.policies.into_keys().collect())
            .ok_or_else(|| AwsError::iam("list", role_name, "NoSuchEntity"))
    }

    async fn put(&self, role_name: &str, policy_name: &str, document: &str) -> AwsResult<()> {
        self.enter("put", format!("{role_name}/{policy_name}")).await?;
        let mut roles = self.roles.lock().unwrap();
        let role = roles
            .get_mut(role_name)
            .ok_or_else(|| AwsError::iam("put", role_name, "NoSuchEntity"))?;
        role.policies
            .insert(policy_name.to_string(), document.to_string());
        Ok(())
    }

    async fn delete(&self, role_name: &str, policy_name: &str) -> AwsResult<()> {
        self.enter("delete", format!("{role_name}/{policy_name}")).await?;
        if let Some(role) = self.roles.lock().unwrap().get_mut(role_name) {
            role.policies.remove(policy_name);
        }
        Ok(())
    }

    async fn delete_role(&self, role_name: &str) -> AwsResult<()> {
        self.enter("delete_role", role_name.to_string()).await?;
        let mut roles = self.roles.lock().unwrap();
        if roles
            .get(role_name)
            .is_some_and(|role| !role.policies.is_empty())
        {
            return Err(AwsError::iam(
                "delete_role",
                role_name,
                "DeleteConflict: role still has inline policies",
            ));
        }
        roles.remove(role_name);
        Ok(())
    }
}

/// Record store that keeps finalizer presence and every status written.
#[derive(Default)]
pub(crate) struct FakeRecordStore {
    statuses: Mutex<Vec<IamRoleStatus>>,
    fail_status: Mutex<bool>,
    log: CallLog,
}

impl FakeRecordStore {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn fail_status_writes(&self) {
        *self.fail_status.lock().unwrap() = true;
    }

    pub fn statuses(&self) -> Vec<IamRoleStatus> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn last_status(&self) -> Option<IamRoleStatus> {
        self.statuses().last().cloned()
    }
}

#[async_trait]
impl RecordStore for FakeRecordStore {
    async fn add_finalizer(&self, record: &RecordRef) -> ReconcileResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("add_finalizer:{record}"));
        Ok(())
    }

    async fn remove_finalizer(&self, record: &RecordRef) -> ReconcileResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("remove_finalizer:{record}"));
        Ok(())
    }

    async fn write_status(&self, record: &RecordRef, status: &IamRoleStatus) -> ReconcileResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("write_status:{record}"));
        if *self.fail_status.lock().unwrap() {
            return Err(ReconcileError::persistence("status: conflict"));
        }
        self.statuses.lock().unwrap().push(status.clone());
        Ok(())
    }
}
