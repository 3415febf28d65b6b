use mediagen_worker::{app_state, config::AppConfig, telemetry};
use std::process::ExitCode;

/// Process one batch of pending work items and exit.
///
/// Exits non-zero when configuration is invalid, startup fails, or the store could
/// not be reached or updated; items that fail individually are recorded as `error`
/// and the run still succeeds.
#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init_tracing();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        kind = %config.work_kind,
        dataset_id = ?config.dataset_id,
        batch_size = config.batch_size,
        model = %config.model_id(),
        "Starting media generation run"
    );

    // Startup failures have already been reported to the callback, if one is set.
    let (pipeline, _pool) = match app_state::build_pipeline(&config).await {
        Ok(built) => built,
        Err(e) => {
            tracing::error!(error = %e, "Application error");
            return ExitCode::FAILURE;
        }
    };

    match pipeline.run_once().await {
        Ok(run) => {
            for result in &run.results {
                tracing::info!(
                    item_id = %result.item_id,
                    input = %result.input_summary,
                    output = %result.output,
                    "Generated"
                );
            }
            tracing::info!(
                processed_count = run.succeeded,
                error_count = run.failed,
                "Processing completed successfully"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Application error");
            ExitCode::FAILURE
        }
    }
}
