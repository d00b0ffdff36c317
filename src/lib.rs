use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use kube::runtime::controller::{Action, Controller, Error as ControllerError};
use kube::runtime::watcher;
use kube::{Api, Client};
use tracing::{debug, info, instrument, warn};

pub mod leader;
pub mod patch;
pub mod routing;

use routing::{AccountTarget, DEFAULT_SERVICE_ACCOUNT};

/// How long a successfully reconciled namespace waits before being revisited.
/// The watches re-deliver changes long before this; the requeue only backstops
/// a missed event.
const RESYNC_INTERVAL: Duration = Duration::from_secs(3600);
const ERROR_REQUEUE: Duration = Duration::from_secs(5);

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("fetching service account")]
    Fetch(#[source] kube::Error),
    #[error("applying automount patch")]
    Apply(#[source] kube::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub struct Context {
    pub client: Client,
}

/// Runs the control loop until a shutdown signal arrives.
///
/// Namespaces are the reconciled objects: a namespace appearing queues its
/// default account for enforcement immediately, without waiting for the
/// control plane to provision the account. The service account watch is
/// bounded server-side to the default name, so other accounts never reach
/// this process at all.
pub async fn run(client: Client) -> anyhow::Result<()> {
    let namespaces = Api::<Namespace>::all(client.clone());
    let accounts = Api::<ServiceAccount>::all(client.clone());
    let default_accounts =
        watcher::Config::default().fields(&format!("metadata.name={DEFAULT_SERVICE_ACCOUNT}"));

    Controller::new(namespaces, watcher::Config::default())
        .watches(accounts, default_accounts, routing::namespace_for_account)
        .shutdown_on_signal()
        .run(reconcile, error_policy, Arc::new(Context { client }))
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(%object, "reconciled"),
                Err(ControllerError::ObjectNotFound(object)) => {
                    // Deleted before we got to it; nothing to enforce.
                    debug!(%object, "object gone before reconciliation")
                }
                Err(error) => warn!(%error, "reconciliation failed"),
            }
        })
        .await;

    Ok(())
}

async fn reconcile(ns: Arc<Namespace>, ctx: Arc<Context>) -> Result<Action> {
    let target = routing::target_for_namespace(&ns);
    reconcile_target(&ctx.client, &target).await
}

/// Drives one account toward `automountServiceAccountToken: false`. Level
/// triggered: re-reads current state on every invocation and writes only when
/// the field is unset or true, so redelivered or reordered events converge on
/// the same outcome.
#[instrument(skip(client), fields(namespace = %target.namespace, name = %target.name))]
pub async fn reconcile_target(client: &Client, target: &AccountTarget) -> Result<Action> {
    if target.name != DEFAULT_SERVICE_ACCOUNT {
        return Ok(Action::requeue(RESYNC_INTERVAL));
    }

    let api = Api::<ServiceAccount>::namespaced(client.clone(), &target.namespace);
    let Some(account) = api.get_opt(&target.name).await.map_err(Error::Fetch)? else {
        // Not yet provisioned, or deleted. The account's own creation event
        // retriggers us; an error-driven requeue would just spin.
        info!("service account not present");
        return Ok(Action::requeue(RESYNC_INTERVAL));
    };

    if account.automount_service_account_token == Some(false) {
        debug!("automount already disabled");
        return Ok(Action::requeue(RESYNC_INTERVAL));
    }

    patch::disable_automount(&api, target)
        .await
        .map_err(Error::Apply)?;
    info!("disabled automount of service account token");
    Ok(Action::requeue(RESYNC_INTERVAL))
}

fn error_policy(_ns: Arc<Namespace>, error: &Error, _ctx: Arc<Context>) -> Action {
    warn!(%error, "error during reconciliation, requeueing");
    Action::requeue(ERROR_REQUEUE)
}
