use mediagen_worker::{
    app_state::{self, AppState},
    config::AppConfig,
    pipeline::BatchPipeline,
    routes, telemetry,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init_tracing();

    tracing::info!("Starting media generation worker");

    // Load configuration
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!(
        "work_items_completed_total",
        "Work items that reached the completed state"
    );
    metrics::describe_counter!(
        "work_items_failed_total",
        "Work items that reached the error state"
    );
    metrics::describe_counter!("batches_total", "Batches run to completion");
    metrics::describe_gauge!("last_batch_size", "Items selected by the latest batch");
    metrics::describe_gauge!("pending_items", "Pending items at the last health check");
    metrics::describe_histogram!(
        "inference_duration_seconds",
        "Time spent in a single model call"
    );

    // Startup failures have already been reported to the callback, if one is set.
    let (pipeline, db_pool) = match app_state::build_pipeline(&config).await {
        Ok(built) => built,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize pipeline");
            return ExitCode::FAILURE;
        }
    };

    if let Some(bind_addr) = config.bind_addr.clone() {
        let state = AppState::new(db_pool, pipeline.store().clone(), config.work_kind);
        let app = routes::router(state, prometheus_handle);

        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .expect("Failed to bind to address");
        tracing::info!("Health endpoint listening on {}", bind_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Health server stopped");
            }
        });
    }

    tracing::info!(
        kind = %config.work_kind,
        batch_size = config.batch_size,
        "Worker ready, starting batch loop"
    );

    let poll_interval = Duration::from_secs(config.poll_interval_secs);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            // Keep the sender alive so the loop never sees a closed channel.
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown requested, finishing current batch");
        let _ = shutdown_tx.send(true);
    });

    poll_loop(&pipeline, poll_interval, shutdown_rx).await;

    pipeline.shutdown().await;
    ExitCode::SUCCESS
}

/// Run batches back to back while work remains, sleeping when the store is drained
/// or unreachable. Shutdown is only observed between batches.
async fn poll_loop(
    pipeline: &BatchPipeline,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    while !*shutdown.borrow() {
        let idle = match pipeline.run_batch().await {
            Ok(run) if run.total_items() > 0 => {
                tracing::debug!("Batch processed, checking for more work");
                false
            }
            Ok(_) => {
                tracing::trace!("No pending items, sleeping");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Batch failed, will retry");
                true
            }
        };

        if idle {
            tokio::select! {
                _ = sleep(poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }
    }
}
