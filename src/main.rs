use metrics_exporter_prometheus::PrometheusBuilder;
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

use printmaps_buildservice::app_state::AppState;
use printmaps_buildservice::config::AppConfig;
use printmaps_buildservice::services::{scheduler::Scheduler, store, worker::BuildWorker};

#[tokio::main]
async fn main() {
    // Load configuration from environment
    let mut config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("printmaps-buildservice: {e}");
            std::process::exit(1);
        }
    };

    // Initialize structured logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match &config.log_file {
        Some(path) => {
            let file = match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => file,
                Err(e) => {
                    eprintln!("printmaps-buildservice: cannot open log file {}: {e}", path.display());
                    std::process::exit(1);
                }
            };
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .json()
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).json().init();
        }
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting printmaps build service"
    );

    if let Err(e) = store::create_directories(&config).await {
        tracing::error!(error = %e, "Cannot create working directories");
        std::process::exit(1);
    }
    if let Err(e) = config.resolve_workdir() {
        tracing::error!(error = %e, "Cannot resolve working directory");
        std::process::exit(1);
    }

    tracing::info!(
        workdir = %config.workdir.display(),
        max_procs = config.max_procs,
        grace_period_secs = config.grace_period_secs,
        poll_interval_secs = config.poll_interval_secs,
        claim_retry_delay_ms = config.claim_retry_delay_ms,
        renderer_command = %config.renderer_command,
        markers_dir = %config.markers_dir.display(),
        styles_file = %config.styles_file.display(),
        pdftk_command = %config.pdftk_command,
        zip_command = %config.zip_command,
        test_mode = config.test_mode,
        build_metrics = config.build_metrics,
        "Configuration loaded"
    );
    for style in &config.styles {
        tracing::info!(style = %style.name, xml = %style.xml().display(), "Map style available");
    }

    // Initialize Prometheus metrics exporter
    if let Some(addr) = config.metrics_addr {
        if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
            tracing::error!(error = %e, "Cannot install Prometheus exporter");
            std::process::exit(1);
        }
        tracing::info!(%addr, "Prometheus exporter listening");
    }

    // Register application metrics
    metrics::describe_counter!("map_builds_total", "Map builds finished, by outcome");
    metrics::describe_histogram!("map_build_duration_seconds", "Wall time of one map build");
    metrics::describe_gauge!("map_builds_active", "Map builds currently running");
    metrics::describe_counter!(
        "order_claims_failed_total",
        "Orders that could not be claimed after the retry"
    );

    let state = AppState::new(config);
    let worker = Arc::new(BuildWorker::new(state.clone()));
    let mut scheduler = Scheduler::new(&state.config, Arc::clone(&state.queue), worker);

    match scheduler.run(shutdown_signal()).await {
        Ok(outcome) => std::process::exit(outcome.exit_code()),
        Err(e) => {
            tracing::error!(error = %e, "Scheduler stopped");
            std::process::exit(1);
        }
    }
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
