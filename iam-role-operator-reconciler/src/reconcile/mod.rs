//! Reconcile engine
//!
//! Drives one desired-state record through the finalizer lifecycle and
//! converges its remote IAM role. The engine holds no locks and no cache: the
//! trigger source must not run two reconciles for the same record at once, and
//! every pass re-reads remote state from scratch.

pub mod lifecycle;
pub mod status;
pub mod upsert;

#[cfg(test)]
pub(crate) mod test_support;

use std::collections::BTreeMap;
use std::future::Future;

use log::{debug, info};

use crate::aws::policy_naming::build_role_name;
use crate::aws::RemoteRoleStore;
use crate::config::OperatorConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::synthesis::{build_inline_policies, build_trust_policy};
use crate::types::RoleDefinition;

pub use lifecycle::LifecycleState;
pub use status::{RecordRef, RecordStore, StatusReporter};
pub use upsert::{DesiredRole, TeardownOutcome, UpsertReport};

/// Result of a successful reconcile pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The finalizer was attached; the next trigger does the remote work.
    FinalizerAdded,
    /// The remote role matches the record.
    Synced(UpsertReport),
    /// Remote cleanup finished and the finalizer was released.
    Released(TeardownOutcome),
    /// Nothing left to do for this record.
    Gone,
}

pub struct ReconcileEngine<S, R> {
    store: S,
    records: R,
    config: OperatorConfig,
}

impl<S, R> ReconcileEngine<S, R>
where
    S: RemoteRoleStore,
    R: RecordStore,
{
    pub fn new(store: S, records: R, config: OperatorConfig) -> Self {
        Self {
            store,
            records,
            config,
        }
    }

    #[cfg(test)]
    pub(crate) fn config(&self) -> &OperatorConfig {
        &self.config
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn records(&self) -> &R {
        &self.records
    }

    /// Name of the remote role backing `definition`.
    pub fn role_name(&self, definition: &RoleDefinition) -> String {
        build_role_name(&self.config.role_name, &definition.name)
    }

    /// Build and encode the documents `definition` asks for.
    pub fn desired_role(&self, definition: &RoleDefinition) -> ReconcileResult<DesiredRole> {
        desired_role(&self.config, definition)
    }

    /// Run one reconcile pass for `definition`.
    ///
    /// Every pass of an active record re-applies the full upsert, even when
    /// the last status already reports this generation as synced.
    pub async fn reconcile(&self, definition: &RoleDefinition) -> ReconcileResult<ReconcileOutcome> {
        let record = RecordRef::of(definition);
        let state = LifecycleState::of(definition);
        let reporter = StatusReporter::new(&self.records);
        info!(
            "Reconciling {record} as IAM role {} ({state})",
            self.role_name(definition)
        );

        match state {
            LifecycleState::Pending => {
                match self.records.add_finalizer(&record).await {
                    Ok(()) => Ok(ReconcileOutcome::FinalizerAdded),
                    Err(e) => reporter.report(definition, Err(e)).await,
                }
            }
            LifecycleState::Active => {
                let outcome = self.with_deadline(self.sync(definition)).await;
                reporter
                    .report(definition, outcome)
                    .await
                    .map(ReconcileOutcome::Synced)
            }
            LifecycleState::Terminating => {
                let role_name = self.role_name(definition);
                let teardown = match self
                    .with_deadline(upsert::teardown(&self.store, &role_name))
                    .await
                {
                    Ok(teardown) => teardown,
                    Err(e) => return reporter.report(definition, Err(e)).await,
                };
                match self.records.remove_finalizer(&record).await {
                    Ok(()) => Ok(ReconcileOutcome::Released(teardown)),
                    Err(e) => reporter.report(definition, Err(e)).await,
                }
            }
            LifecycleState::Gone => {
                debug!("{record} has no finalizer and is being deleted; nothing to do");
                Ok(ReconcileOutcome::Gone)
            }
        }
    }

    async fn sync(&self, definition: &RoleDefinition) -> ReconcileResult<UpsertReport> {
        let desired = self.desired_role(definition)?;
        let report = upsert::upsert(&self.store, &desired).await?;
        info!(
            "IAM role {} synced (created: {}, put: {}, deleted: {})",
            desired.role_name,
            report.created,
            report.put.len(),
            report.deleted.len()
        );
        Ok(report)
    }

    /// Drop `work` and fail if it outlives the configured deadline.
    async fn with_deadline<T>(
        &self,
        work: impl Future<Output = ReconcileResult<T>>,
    ) -> ReconcileResult<T> {
        let limit = self.config.reconcile_timeout();
        match tokio::time::timeout(limit, work).await {
            Ok(result) => result,
            Err(_) => Err(ReconcileError::DeadlineExceeded(limit)),
        }
    }
}

/// Build and encode the trust policy and inline policies for `definition`.
pub fn desired_role(
    config: &OperatorConfig,
    definition: &RoleDefinition,
) -> ReconcileResult<DesiredRole> {
    let trust_policy = build_trust_policy(
        &definition.service_accounts,
        &definition.namespace,
        &config.oidc.issuer_url,
        &config.oidc.provider_arn,
    )
    .to_json()?;

    let inline_policies: BTreeMap<String, String> =
        build_inline_policies(&definition.statements, &config.inline_policy_name)
            .into_iter()
            .map(|(name, document)| -> ReconcileResult<(String, String)> {
                Ok((name, document.to_json()?))
            })
            .collect::<ReconcileResult<_>>()?;

    Ok(DesiredRole {
        role_name: build_role_name(&config.role_name, &definition.name),
        trust_policy,
        inline_policies,
    })
}
