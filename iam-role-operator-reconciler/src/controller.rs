//! Watch loop feeding `IamRole` changes into the reconcile engine.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, ResourceExt};
use log::{debug, error, info, warn};

use crate::aws::iam_client::AwsIamRoleStore;
use crate::config::OperatorConfig;
use crate::crd::IamRole;
use crate::error::ReconcileError;
use crate::kube_store::KubeRecordStore;
use crate::reconcile::{ReconcileEngine, ReconcileOutcome};

/// Requeue delay after a failure that may clear up on its own.
pub const RETRY_REQUEUE: Duration = Duration::from_secs(30);

/// Requeue delay after a failure that needs someone to intervene.
pub const BLOCKED_REQUEUE: Duration = Duration::from_secs(300);

/// Server-side watch timeout, kept below the client's read timeout.
const WATCH_TIMEOUT_SECS: u32 = 25;

pub type OperatorEngine = ReconcileEngine<AwsIamRoleStore, KubeRecordStore>;

pub struct Context {
    pub engine: OperatorEngine,
}

impl Context {
    pub fn new(engine: OperatorEngine) -> Self {
        Self { engine }
    }
}

pub async fn reconcile(role: Arc<IamRole>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let definition = role.to_definition();
    match ctx.engine.reconcile(&definition).await? {
        ReconcileOutcome::FinalizerAdded => {
            debug!("Finalizer added to {}; waiting for the update", role.name_any());
        }
        ReconcileOutcome::Synced(report) => {
            debug!("{} synced: {report:?}", role.name_any());
        }
        ReconcileOutcome::Released(outcome) => {
            info!("{} released after teardown: {outcome:?}", role.name_any());
        }
        ReconcileOutcome::Gone => {}
    }
    Ok(Action::await_change())
}

pub fn error_policy(role: Arc<IamRole>, error: &ReconcileError, _ctx: Arc<Context>) -> Action {
    warn!(
        "Reconcile of {}/{} failed: {error}",
        role.namespace().unwrap_or_default(),
        role.name_any()
    );
    Action::requeue(requeue_after(error))
}

/// Backoff for a failed reconcile.
pub fn requeue_after(error: &ReconcileError) -> Duration {
    if error.is_retryable() {
        RETRY_REQUEUE
    } else {
        BLOCKED_REQUEUE
    }
}

/// Build the engine from `config` and run the controller until a shutdown
/// signal arrives.
pub async fn run(
    client: Client,
    config: OperatorConfig,
    watch_namespace: Option<String>,
) -> Result<(), ReconcileError> {
    config
        .validate()
        .map_err(|e| ReconcileError::config(e.to_string()))?;
    let store = AwsIamRoleStore::from_env(config.region.as_deref()).await?;
    let records = KubeRecordStore::new(client.clone());
    let ctx = Arc::new(Context::new(ReconcileEngine::new(store, records, config)));

    let roles: Api<IamRole> = match &watch_namespace {
        Some(namespace) => {
            info!("Watching IamRole resources in namespace {namespace}");
            Api::namespaced(client, namespace)
        }
        None => {
            info!("Watching IamRole resources in all namespaces");
            Api::all(client)
        }
    };

    // Every write to the record re-triggers it. Status text carries no
    // per-request data, so a repeated outcome writes nothing and the pass settles.
    Controller::new(roles, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, action)) => debug!("Reconciled {object}: {action:?}"),
                Err(e) => error!("Controller error: {e}"),
            }
        })
        .await;

    info!("Controller stopped");
    Ok(())
}
