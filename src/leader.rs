use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use k8s_openapi::api::coordination::v1 as coordv1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info};

use crate::patch::FIELD_MANAGER;

const LEASE_DURATION: time::Duration = time::Duration::from_secs(30);
const LEASE_NAME: &str = "automount-controller-write";
const RENEW_GRACE_PERIOD: time::Duration = time::Duration::from_secs(1);

pub type Claims = watch::Receiver<Arc<kubert::lease::Claim>>;

/// Creates the leadership Lease in the election namespace (if it does not
/// already exist) and spawns the claim task for it.
pub async fn init(client: &Client, namespace: &str, claimant: &str) -> Result<Claims> {
    let lease = coordv1::Lease {
        metadata: ObjectMeta {
            name: Some(LEASE_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            // Resource version "0" makes the apply create-only.
            resource_version: Some("0".to_string()),
            ..Default::default()
        },
        spec: None,
    };
    let api = Api::<coordv1::Lease>::namespaced(client.clone(), namespace);
    match api
        .patch(
            LEASE_NAME,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Apply(&lease),
        )
        .await
    {
        Ok(_) => info!(lease = LEASE_NAME, "created leadership lease"),
        Err(kube::Error::Api(_)) => debug!(lease = LEASE_NAME, "leadership lease already exists"),
        Err(error) => return Err(anyhow!(error).context("creating leadership lease")),
    }

    let params = kubert::lease::ClaimParams {
        lease_duration: LEASE_DURATION,
        renew_grace_period: RENEW_GRACE_PERIOD,
    };
    let (claims, _task) = kubert::lease::LeaseManager::init(api, LEASE_NAME)
        .await?
        .spawn(claimant, params)
        .await?;
    Ok(claims)
}

/// Blocks until this instance holds the lease.
pub async fn wait_for_leadership(claims: &mut Claims, claimant: &str) -> Result<()> {
    claims
        .wait_for(|claim| claim.is_current_for(claimant))
        .await
        .context("leadership lease task stopped")?;
    Ok(())
}

/// Resolves once leadership is lost. Only one instance may write at a time;
/// after a lost claim the process must stop reconciling and restart.
pub async fn lost_leadership(mut claims: Claims, claimant: String) -> anyhow::Error {
    loop {
        if claims.changed().await.is_err() {
            return anyhow!("leadership lease task stopped");
        }
        if !claims.borrow().is_current_for(&claimant) {
            return anyhow!("lost leadership lease");
        }
    }
}
