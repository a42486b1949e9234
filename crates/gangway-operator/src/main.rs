//! Gangway operator - gang-scheduling control plane for Volcano PodGroups

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, CustomResourceExt};
use tokio_util::sync::CancellationToken;

use gangway_common::crd::{PodGroup, Queue};
use gangway_common::events::KubeEventPublisher;
use gangway_common::telemetry::init_logging;
use gangway_operator::config::Cli;
use gangway_operator::controller_runner::{
    build_queue_controller, run_pod_deletion_watcher, run_startup_sweep,
};
use gangway_podgroup::{GangReconciler, KubeClusterClient};

const CONTROLLER_NAME: &str = "gangway-podgroup-controller";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let pod_group = serde_yaml::to_string(&PodGroup::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize PodGroup CRD: {}", e))?;
        let queue = serde_yaml::to_string(&Queue::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize Queue CRD: {}", e))?;
        println!("{pod_group}---\n{queue}");
        return Ok(());
    }

    init_logging(cli.log_format)?;

    run(cli).await
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    tracing::info!("gangway starting...");

    let client = build_client(cli.kubeconfig.as_deref()).await?;

    let token = CancellationToken::new();
    {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                token.cancel();
            }
        });
    }

    let reconciler = Arc::new(GangReconciler::new(
        Arc::new(KubeClusterClient::new(client.clone())),
        Arc::new(KubeEventPublisher::new(client.clone(), CONTROLLER_NAME)),
        cli.reconciler_config(),
    ));

    let retry = cli.retry_config();
    if cli.skip_startup_sweep {
        tracing::info!("startup sweep disabled");
    } else if let Err(e) = run_startup_sweep(&reconciler, &retry, &token).await {
        // Deletion events still drive cleanup; the sweep is best effort
        tracing::warn!(error = %e, "startup sweep aborted");
    }

    let pod_watcher = run_pod_deletion_watcher(
        client.clone(),
        reconciler,
        cli.scheduler_name.clone(),
        retry,
        token.clone(),
    );
    let queue_controller = build_queue_controller(client, cli.queue_config());

    tokio::join!(pod_watcher, queue_controller);

    tracing::info!("gangway stopped");
    Ok(())
}

async fn build_client(kubeconfig: Option<&Path>) -> anyhow::Result<Client> {
    let Some(path) = kubeconfig else {
        return Client::try_default()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e));
    };

    let kubeconfig = Kubeconfig::read_from(path)
        .map_err(|e| anyhow::anyhow!("Failed to read kubeconfig {}: {}", path.display(), e))?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load kubeconfig {}: {}", path.display(), e))?;
    Client::try_from(config)
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))
}
