//! Kubernetes-backed [`RecordStore`] for `IamRole` resources.
//!
//! Finalizer writes are read-modify-write: the latest object is fetched, the
//! patch carries its `resourceVersion`, and a 409 re-reads and tries again.
//! Status writes are pinned to the version the reconcile read instead. A 409
//! there means the record moved on and the status would be stale, so it is
//! reported as a failure and the record is reconciled again.

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use log::{debug, info};
use serde_json::{json, Value};

use crate::crd::{IamRole, IamRoleStatus, ROLE_FINALIZER};
use crate::error::{ReconcileError, ReconcileResult};
use crate::reconcile::{RecordRef, RecordStore};

/// Attempts per finalizer write before giving up on conflicting updates.
pub const MAX_CONFLICT_RETRIES: usize = 5;

#[derive(Clone)]
pub struct KubeRecordStore {
    client: Client,
}

impl KubeRecordStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, record: &RecordRef) -> Api<IamRole> {
        Api::namespaced(self.client.clone(), &record.namespace)
    }

    /// Patch the finalizers of the latest version of `record`.
    ///
    /// `build` returns `None` when the object already has the desired shape.
    /// A record that no longer exists is treated as written.
    async fn patch_finalizers<F>(&self, record: &RecordRef, build: F) -> ReconcileResult<()>
    where
        F: Fn(&IamRole) -> Option<Value> + Send + Sync,
    {
        let api = self.api(record);

        for attempt in 1..=MAX_CONFLICT_RETRIES {
            let latest = api
                .get_opt(&record.name)
                .await
                .map_err(|e| ReconcileError::persistence(format!("finalizer of {record}: {e}")))?;
            let Some(latest) = latest else {
                debug!("{record} no longer exists; skipping finalizer update");
                return Ok(());
            };
            let Some(body) = build(&latest) else {
                return Ok(());
            };
            let patch = with_resource_version(body, latest.resource_version());

            match api
                .patch(&record.name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
            {
                Ok(_) => return Ok(()),
                Err(kube::Error::Api(ae)) if ae.code == 409 => {
                    debug!("Conflict writing finalizer of {record} (attempt {attempt}), retrying");
                }
                Err(kube::Error::Api(ae)) if ae.code == 404 => {
                    debug!("{record} disappeared while writing its finalizer");
                    return Ok(());
                }
                Err(e) => {
                    return Err(ReconcileError::persistence(format!(
                        "finalizer of {record}: {e}"
                    )))
                }
            }
        }

        Err(ReconcileError::persistence(format!(
            "finalizer of {record}: still conflicting after {MAX_CONFLICT_RETRIES} attempts"
        )))
    }
}

/// Finalizer list with ours appended, or `None` if already present.
pub(crate) fn finalizers_with(current: &[String]) -> Option<Vec<String>> {
    if current.iter().any(|f| f == ROLE_FINALIZER) {
        return None;
    }
    let mut finalizers = current.to_vec();
    finalizers.push(ROLE_FINALIZER.to_string());
    Some(finalizers)
}

/// Finalizer list with ours removed, or `None` if it was not there.
pub(crate) fn finalizers_without(current: &[String]) -> Option<Vec<String>> {
    if !current.iter().any(|f| f == ROLE_FINALIZER) {
        return None;
    }
    Some(
        current
            .iter()
            .filter(|f| *f != ROLE_FINALIZER)
            .cloned()
            .collect(),
    )
}

/// Status patch guarded by the version the reconcile read.
pub(crate) fn status_patch(record: &RecordRef, status: &IamRoleStatus) -> Value {
    with_resource_version(
        json!({ "status": status }),
        record.resource_version.clone(),
    )
}

/// Failure for a status write rejected because the record changed after it
/// was read.
pub(crate) fn stale_status_error(record: &RecordRef) -> ReconcileError {
    ReconcileError::persistence(format!(
        "status of {record}: record changed since version {} was read",
        record.resource_version.as_deref().unwrap_or("<unknown>")
    ))
}

/// Pin a merge patch to `resource_version` so a stale write is rejected.
pub(crate) fn with_resource_version(mut body: Value, resource_version: Option<String>) -> Value {
    if let (Some(rv), Some(object)) = (resource_version, body.as_object_mut()) {
        let metadata = object.entry("metadata").or_insert_with(|| json!({}));
        if let Some(metadata) = metadata.as_object_mut() {
            metadata.insert("resourceVersion".to_string(), Value::String(rv));
        }
    }
    body
}

#[async_trait]
impl RecordStore for KubeRecordStore {
    async fn add_finalizer(&self, record: &RecordRef) -> ReconcileResult<()> {
        info!("Adding finalizer to {record}");
        self.patch_finalizers(record, |role| {
            finalizers_with(role.finalizers())
                .map(|finalizers| json!({"metadata": {"finalizers": finalizers}}))
        })
        .await
    }

    async fn remove_finalizer(&self, record: &RecordRef) -> ReconcileResult<()> {
        info!("Removing finalizer from {record}");
        self.patch_finalizers(record, |role| {
            finalizers_without(role.finalizers())
                .map(|finalizers| json!({"metadata": {"finalizers": finalizers}}))
        })
        .await
    }

    async fn write_status(
        &self,
        record: &RecordRef,
        status: &IamRoleStatus,
    ) -> ReconcileResult<()> {
        let patch = status_patch(record, status);
        match self
            .api(record)
            .patch_status(&record.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Err(stale_status_error(record)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!("{record} no longer exists; skipping status update");
                Ok(())
            }
            Err(e) => Err(ReconcileError::persistence(format!(
                "status of {record}: {e}"
            ))),
        }
    }
}
