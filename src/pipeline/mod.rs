//! Batch pipeline: select pending work, drive each item to a terminal state,
//! report the run.
//!
//! Items are processed strictly one after another. The inference engine owns a
//! single accelerator, so a batch never has more than one model call in flight.

mod processor;

pub use processor::{ItemFailure, ItemOutcome};

use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;
use crate::models::generation::BatchRun;
use crate::models::model_config::ModelSelection;
use crate::models::notification::NotificationPayload;
use crate::models::work_item::{WorkItem, WorkKind};
use crate::services::inference::InferenceEngine;
use crate::services::notifier::Notifier;
use crate::services::storage::ArtifactSink;
use crate::services::store::{StoreError, WorkItemStore};

/// Fatal pipeline failure. Per-item problems never surface here.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Work item store failure: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub kind: WorkKind,
    pub scope: Option<String>,
    pub batch_size: u32,
    /// Report runs that selected nothing.
    pub notify_on_empty: bool,
    /// Stored model configuration in use, echoed in completion reports.
    pub model_config_id: Option<String>,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig, selection: &ModelSelection) -> Self {
        Self {
            kind: config.work_kind,
            scope: config.dataset_id.clone(),
            batch_size: selection.batch_size,
            notify_on_empty: config.notify_on_empty,
            model_config_id: selection.config_id.clone(),
        }
    }
}

/// Owns the store connection and the loaded model for its whole lifetime.
pub struct BatchPipeline {
    settings: PipelineSettings,
    store: Arc<dyn WorkItemStore>,
    engine: Arc<dyn InferenceEngine>,
    sink: Option<Arc<dyn ArtifactSink>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl BatchPipeline {
    pub fn new(
        settings: PipelineSettings,
        store: Arc<dyn WorkItemStore>,
        engine: Arc<dyn InferenceEngine>,
    ) -> Self {
        Self {
            settings,
            store,
            engine,
            sink: None,
            notifier: None,
        }
    }

    pub fn with_artifact_sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn WorkItemStore> {
        &self.store
    }

    /// Pending items for this pipeline's kind and scope, at most `batch_size`.
    pub async fn select_batch(&self) -> Result<Vec<WorkItem>, PipelineError> {
        let mut items = self
            .store
            .find_pending(
                self.settings.kind,
                self.settings.scope.as_deref(),
                self.settings.batch_size,
            )
            .await?;
        items.truncate(self.settings.batch_size as usize);
        Ok(items)
    }

    /// Run one batch and report it.
    ///
    /// A store failure is reported to the notifier as an error and returned; every
    /// other failure is recorded on its item.
    pub async fn run_batch(&self) -> Result<BatchRun, PipelineError> {
        let started = Instant::now();

        match self.execute().await {
            Ok(run) => {
                tracing::info!(
                    kind = %self.settings.kind,
                    dataset_id = ?self.settings.scope,
                    total_items = run.total_items(),
                    processed_count = run.succeeded,
                    error_count = run.failed,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Batch finished"
                );
                metrics::counter!("batches_total", "kind" => self.settings.kind.to_string())
                    .increment(1);

                if run.total_items() > 0 || self.settings.notify_on_empty {
                    self.notify(&NotificationPayload::completed(
                        &run,
                        self.settings.kind,
                        self.settings.scope.as_deref(),
                        self.engine.model_id(),
                        self.settings.model_config_id.as_deref(),
                    ))
                    .await;
                }
                Ok(run)
            }
            Err(e) => {
                tracing::error!(error = %e, kind = %self.settings.kind, "Batch aborted");
                self.notify(&NotificationPayload::error(&e)).await;
                Err(e)
            }
        }
    }

    async fn execute(&self) -> Result<BatchRun, PipelineError> {
        let items = self.select_batch().await?;
        tracing::info!(
            count = items.len(),
            kind = %self.settings.kind,
            dataset_id = ?self.settings.scope,
            "Found items to process"
        );
        metrics::gauge!("last_batch_size", "kind" => self.settings.kind.to_string())
            .set(items.len() as f64);

        let mut run = BatchRun::new(items.iter().map(|item| item.id).collect());
        for item in &items {
            match self.process_item(item).await? {
                ItemOutcome::Succeeded(result) => run.record_success(result),
                ItemOutcome::Failed(_) => run.record_failure(),
            }
        }

        Ok(run)
    }

    async fn notify(&self, payload: &NotificationPayload) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(payload).await;
        }
    }

    /// Release the model and close the store.
    pub async fn shutdown(&self) {
        self.engine.release().await;
        self.store.close().await;
        tracing::info!("Pipeline shut down");
    }

    /// Run a single batch, then shut down whatever the outcome.
    pub async fn run_once(self) -> Result<BatchRun, PipelineError> {
        let outcome = self.run_batch().await;
        self.shutdown().await;
        outcome
    }
}
