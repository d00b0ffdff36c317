use anyhow::{Context, Result};
use clap::Parser;
use kube::Client;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use automount_controller::leader;

/// Keeps `automountServiceAccountToken` disabled on the default service
/// account of every namespace.
#[derive(Debug, Parser)]
#[clap(name = "automount-controller")]
struct Settings {
    /// Namespace holding the leadership lease.
    #[clap(long, env = "CONTROLLER_NAMESPACE")]
    election_namespace: String,

    /// Identity used when claiming the leadership lease.
    #[clap(long, env = "HOSTNAME", default_value = "automount-controller")]
    claimant: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let logger = tracing_subscriber::fmt::layer().json();
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(logger)
        .with(env_filter)
        .init();

    let settings = Settings::parse();

    let client = Client::try_default()
        .await
        .context("initializing Kubernetes client")?;

    let mut claims = leader::init(&client, &settings.election_namespace, &settings.claimant)
        .await
        .context("initializing leadership lease")?;
    info!(
        namespace = %settings.election_namespace,
        claimant = %settings.claimant,
        "waiting for leadership"
    );
    leader::wait_for_leadership(&mut claims, &settings.claimant).await?;
    info!("acquired leadership, starting controller");

    tokio::select! {
        result = automount_controller::run(client) => result,
        error = leader::lost_leadership(claims, settings.claimant) => Err(error),
    }
}
