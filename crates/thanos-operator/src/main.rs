//! Thanos Operator
//!
//! Kubernetes operator running the ThanosQuery and ThanosReceive controllers.

use clap::{Parser, Subcommand};
use kube::CustomResourceExt;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use thanos_operator::{
    client::KubeClient,
    config::{LogOutput, OperatorConfig},
    controllers::{Context, QueryController, ReceiveController},
    crds::{ThanosQuery, ThanosReceive},
    observability::Metrics,
};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "thanos-operator")]
#[command(about = "Kubernetes operator for Thanos query and receive tiers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print CRD manifests to stdout
    Crds,
    /// Run the operator
    Run(OperatorConfig),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Crds => print_crds(),
        Commands::Run(config) => run_operator(config).await,
    }
}

fn print_crds() -> anyhow::Result<()> {
    println!("---");
    println!("{}", serde_yaml::to_string(&ThanosQuery::crd())?);
    println!("---");
    println!("{}", serde_yaml::to_string(&ThanosReceive::crd())?);
    Ok(())
}

fn init_tracing(format: LogOutput) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let (text, json) = match format {
        LogOutput::Text => (Some(fmt::layer()), None),
        LogOutput::Json => (None, Some(fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(text)
        .with(json)
        .with(filter)
        .init();
}

async fn run_operator(config: OperatorConfig) -> anyhow::Result<()> {
    init_tracing(config.log_format);

    info!("Starting thanos-operator");

    PrometheusBuilder::new()
        .with_http_listener(config.metrics_addr)
        .install()?;
    info!(addr = %config.metrics_addr, "Serving metrics");

    let metrics = Metrics::new();

    let client = kube::Client::try_default().await?;
    info!("Connected to Kubernetes");

    let cluster = Arc::new(KubeClient::new(client.clone(), config.field_manager.clone()));
    let ctx = Arc::new(Context::new(cluster, metrics, config));

    // Run all controllers concurrently
    tokio::select! {
        _ = QueryController::run(client.clone(), ctx.clone()) => {}
        _ = ReceiveController::run(client, ctx) => {}
    }

    info!("Controllers stopped, shutting down");
    Ok(())
}
