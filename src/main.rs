// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use axum::{http::StatusCode, routing::get, Router};
use cf_k8s_controllers::{
    config::{load_role_mappings, ControllerConfig},
    context::Context,
    engine::Engine,
    metrics,
    reconcilers::build_registry,
    store::{cluster::KubeStore, ResourceStore},
};
use clap::Parser;
use kube::Client;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Reconciliation controllers for Organizations, Spaces, Roles and `ServiceBindings`.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// YAML file mapping role types to ClusterRole names (overrides `ROLE_MAPPINGS_PATH`)
    #[arg(long, value_name = "PATH")]
    role_mappings: Option<PathBuf>,

    /// Log output format: `text` or `json` (overrides `RUST_LOG_FORMAT`)
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .thread_name("cf-k8s-controllers")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

fn init_logging(format: Option<&str>) {
    // Respects RUST_LOG if set, otherwise defaults to INFO level
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = format.map_or_else(
        || std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
        str::to_string,
    );

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(args: Args) -> Result<()> {
    init_logging(args.log_format.as_deref());
    info!("Starting cf-k8s-controllers");

    let mut config = ControllerConfig::from_env().context("loading configuration")?;
    if let Some(path) = &args.role_mappings {
        config.role_mappings = load_role_mappings(path)
            .with_context(|| format!("loading role mappings from {}", path.display()))?;
    }
    debug!(
        root_namespace = %config.root_namespace,
        workers = config.workers_per_controller,
        role_types = config.role_mappings.len(),
        "Configuration loaded"
    );

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    let store: Arc<dyn ResourceStore> = Arc::new(KubeStore::new(client));

    let bind_address = config.metrics_bind_address.clone();
    let engine_config = config.engine_config();
    let ctx = Arc::new(Context::new(store.clone(), config));
    let engine = Engine::new(store, build_registry(&ctx), engine_config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ready = Arc::new(AtomicBool::new(false));

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding metrics server to {bind_address}"))?;
    info!("Serving /metrics, /healthz and /readyz on {}", bind_address);
    let server = tokio::spawn(serve_operational_endpoints(
        listener,
        ready.clone(),
        shutdown_rx.clone(),
    ));

    let engine_task = tokio::spawn(engine.run(shutdown_rx));
    ready.store(true, Ordering::SeqCst);

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, stopping controllers");
    ready.store(false, Ordering::SeqCst);
    shutdown_tx.send(true)?;

    if let Err(e) = engine_task.await {
        error!("Engine task failed: {e}");
    }
    match server.await {
        Ok(Err(e)) => error!("Metrics server failed: {e}"),
        Err(e) => error!("Metrics server task failed: {e}"),
        Ok(Ok(())) => {}
    }
    info!("Shutdown complete");
    Ok(())
}

async fn serve_operational_endpoints(
    listener: tokio::net::TcpListener,
    ready: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { "ok" }))
        .route(
            "/readyz",
            get(move || {
                let ready = ready.load(Ordering::SeqCst);
                async move {
                    if ready {
                        (StatusCode::OK, "ready")
                    } else {
                        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
                    }
                }
            }),
        );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}

async fn metrics_handler() -> (StatusCode, String) {
    match metrics::gather_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("Failed to encode metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
