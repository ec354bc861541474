//! Persisting reconcile outcomes back onto the desired-state record.

use std::fmt;

use async_trait::async_trait;
use log::{error, warn};

#[cfg(test)]
use mockall::automock;

use crate::crd::{IamRoleStatus, SyncState, NO_ERROR};
use crate::error::{ReconcileError, ReconcileResult};
use crate::types::RoleDefinition;

/// Identity of a desired-state record, plus the version a reconcile read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    pub namespace: String,
    pub name: String,
    pub resource_version: Option<String>,
}

impl RecordRef {
    pub fn of(definition: &RoleDefinition) -> Self {
        Self {
            namespace: definition.record_namespace.clone(),
            name: definition.name.clone(),
            resource_version: definition.resource_version.clone(),
        }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Writes the engine is allowed to make on a desired-state record.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Attach the finalizer. Attaching an already present finalizer succeeds.
    async fn add_finalizer(&self, record: &RecordRef) -> ReconcileResult<()>;

    /// Release the finalizer. Releasing on a purged record succeeds.
    async fn remove_finalizer(&self, record: &RecordRef) -> ReconcileResult<()>;

    /// Overwrite the status block of the version in `record`.
    ///
    /// Fails without writing if the record changed since that version was
    /// read, so a status derived from stale desired state is never stored.
    async fn write_status(&self, record: &RecordRef, status: &IamRoleStatus)
        -> ReconcileResult<()>;
}

/// Status describing the outcome of one reconcile attempt.
///
/// A failed attempt keeps the observed generation of the last success so the
/// lag between `generation` and `observedGeneration` stays visible.
pub fn status_for(definition: &RoleDefinition, failure: Option<&ReconcileError>) -> IamRoleStatus {
    match failure {
        None => IamRoleStatus {
            state: SyncState::Ok,
            error: NO_ERROR.to_string(),
            observed_generation: definition.generation,
        },
        Some(err) => IamRoleStatus {
            state: SyncState::Error,
            error: err.to_string(),
            observed_generation: definition.observed_generation,
        },
    }
}

pub struct StatusReporter<'a, R: ?Sized> {
    records: &'a R,
}

impl<'a, R: RecordStore + ?Sized> StatusReporter<'a, R> {
    pub fn new(records: &'a R) -> Self {
        Self { records }
    }

    /// Record `outcome` on the record and hand it back.
    ///
    /// If the status write fails, a successful outcome becomes a persistence
    /// error so the trigger retries; a failed outcome keeps its own error.
    pub async fn report<T>(
        &self,
        definition: &RoleDefinition,
        outcome: ReconcileResult<T>,
    ) -> ReconcileResult<T> {
        let record = RecordRef::of(definition);
        let status = status_for(definition, outcome.as_ref().err());
        if let Err(e) = &outcome {
            warn!("Reconcile of {record} failed: {e}");
        }

        match self.records.write_status(&record, &status).await {
            Ok(()) => outcome,
            Err(write_err) => {
                error!("Unable to update status of {record}: {write_err}");
                match outcome {
                    Ok(_) => Err(write_err),
                    Err(e) => Err(e),
                }
            }
        }
    }
}
