// Kubernetes Operator binary
use anyhow::{Context, Result};
use clap::Parser;
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use monitoring_stack_operator::config::{Args, ConfigLoader};
use monitoring_stack_operator::logging::init_logging;
use monitoring_stack_operator::operator::crd::crd_manifests;
use monitoring_stack_operator::Operator;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_crds {
        print!("{}", crd_manifests()?);
        return Ok(());
    }

    let config = ConfigLoader::new()
        .load_from_env()
        .load_from_cli(args)
        .build()
        .context("invalid configuration")?;

    let _guard = init_logging(&config.log)?;
    info!("Starting monitoring stack operator");

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    info!("Connected to Kubernetes cluster");

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
        }
        shutdown.cancel();
    });

    Operator::new(client, config).run(cancel).await;
    info!("Operator stopped");
    Ok(())
}
