use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::db::{self, queries};
use crate::models::model_config::ModelSelection;
use crate::models::notification::NotificationPayload;
use crate::models::work_item::WorkKind;
use crate::pipeline::{BatchPipeline, PipelineSettings};
use crate::services::{
    inference::{InferenceError, WorkersAiClient, WorkersAiSettings},
    notifier::{HttpNotifier, Notifier},
    storage::{R2Client, StorageError},
    store::{PgWorkItemStore, WorkItemStore},
};

/// Shared state for the worker's HTTP routes.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub store: Arc<dyn WorkItemStore>,
    pub kind: WorkKind,
}

impl AppState {
    pub fn new(db: PgPool, store: Arc<dyn WorkItemStore>, kind: WorkKind) -> Self {
        Self { db, store, kind }
    }
}

/// Connect to every collaborator named in `config` and assemble a pipeline.
///
/// The callback notifier is built first so that a failure further on, such as an
/// unreachable store, is reported to it before the error is returned. Returns the
/// pool alongside so callers can serve health checks.
pub async fn build_pipeline(config: &AppConfig) -> Result<(BatchPipeline, PgPool), StartupError> {
    let notifier = build_notifier(config)?;

    match assemble(config, notifier.clone()).await {
        Ok(built) => Ok(built),
        Err(e) => {
            if let Some(notifier) = &notifier {
                notifier.notify(&NotificationPayload::error(&e)).await;
            }
            Err(e)
        }
    }
}

fn build_notifier(config: &AppConfig) -> Result<Option<Arc<dyn Notifier>>, StartupError> {
    let Some(url) = &config.callback_url else {
        return Ok(None);
    };

    tracing::info!(callback_url = %url, "Callback notifications enabled");
    let notifier = HttpNotifier::new(
        url.clone(),
        Duration::from_secs(config.callback_timeout_secs),
    )
    .map_err(StartupError::Notifier)?;
    let notifier: Arc<dyn Notifier> = Arc::new(notifier);
    Ok(Some(notifier))
}

async fn assemble(
    config: &AppConfig,
    notifier: Option<Arc<dyn Notifier>>,
) -> Result<(BatchPipeline, PgPool), StartupError> {
    tracing::info!("Connecting to PostgreSQL");
    let pool = db::init_pool(
        &config.database_url,
        Duration::from_secs(config.db_connect_timeout_secs),
    )
    .await?;
    db::run_migrations(&pool).await?;
    let store = Arc::new(PgWorkItemStore::new(pool.clone()));

    let selection = select_model(&pool, config).await?;

    tracing::info!(model = %selection.model_id, "Initializing Cloudflare Workers AI client");
    let engine = Arc::new(WorkersAiClient::new(WorkersAiSettings::from_config(
        config, &selection,
    ))?);

    let mut pipeline = BatchPipeline::new(
        PipelineSettings::from_config(config, &selection),
        store,
        engine,
    );

    if config.work_kind == WorkKind::Generate {
        let r2 = config.r2_settings().ok_or_else(|| {
            StartupError::Storage(StorageError::Config(
                "R2 settings are required for image generation".to_string(),
            ))
        })?;
        tracing::info!("Initializing R2 storage client");
        let sink = R2Client::new(
            &r2,
            &config.artifact_prefix,
            config.artifact_public_url.as_deref(),
        )?;
        pipeline = pipeline.with_artifact_sink(Arc::new(sink));
    }

    if let Some(notifier) = notifier {
        pipeline = pipeline.with_notifier(notifier);
    }

    Ok((pipeline, pool))
}

/// Look up the stored model configuration and merge it over the environment.
async fn select_model(pool: &PgPool, config: &AppConfig) -> Result<ModelSelection, StartupError> {
    let requested = config.model_config_id.as_deref();
    let stored = queries::get_model_config(pool, config.work_kind, requested).await?;

    match (&stored, requested) {
        (Some(stored), _) => {
            tracing::info!(model_config_id = %stored.id, "Using stored model configuration")
        }
        (None, Some(id)) => tracing::warn!(
            model_config_id = id,
            "Model configuration not found, using environment defaults"
        ),
        (None, None) => {
            tracing::debug!("No default model configuration stored, using environment defaults")
        }
    }

    Ok(ModelSelection::resolve(config, stored.as_ref()))
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Database setup failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Inference client setup failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Artifact storage setup failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Notifier setup failed: {0}")]
    Notifier(reqwest::Error),
}
