//! Per-item state machine: `Selected → Processing → {Succeeded, Failed}`.
//!
//! Nothing is written to the store until the outcome is known, so an item whose
//! processing is interrupted stays `pending` and is picked up by a later run.

use chrono::Utc;
use std::time::Instant;

use super::{BatchPipeline, PipelineError};
use crate::models::generation::GenerationResult;
use crate::models::work_item::{ItemOutput, StatusUpdate, WorkItem, WorkKind};
use crate::services::inference::{InferenceError, InferenceInput, InferenceOutput};
use crate::services::storage::StorageError;

/// Why a single item failed. Recorded on the item; never aborts the batch.
#[derive(Debug, thiserror::Error)]
pub enum ItemFailure {
    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Artifact upload failed: {0}")]
    Storage(#[from] StorageError),

    #[error("No artifact sink configured for generated images")]
    MissingSink,

    #[error("Model produced {produced} output for a {kind} item")]
    UnexpectedOutput {
        kind: WorkKind,
        produced: &'static str,
    },
}

/// Terminal outcome of one item.
#[derive(Debug)]
pub enum ItemOutcome {
    Succeeded(GenerationResult),
    Failed(ItemFailure),
}

/// First 50 characters of an input, for log lines.
pub(crate) fn preview(input: &str) -> String {
    let mut chars = input.chars();
    let head: String = chars.by_ref().take(50).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

fn artifact_name(item: &WorkItem, content_type: &str) -> String {
    let extension = image::ImageFormat::from_mime_type(content_type)
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("bin");
    format!("{}_{}.{}", item.id, Utc::now().timestamp(), extension)
}

impl BatchPipeline {
    /// Drive one item to a terminal state and persist it.
    ///
    /// Only a store failure is returned as `Err`; model and upload failures come
    /// back as [`ItemOutcome::Failed`].
    pub(crate) async fn process_item(&self, item: &WorkItem) -> Result<ItemOutcome, PipelineError> {
        tracing::info!(
            item_id = %item.id,
            kind = %item.kind,
            input = %preview(&item.input),
            "Processing work item"
        );

        match self.produce(item).await {
            Ok(output) => {
                let result = GenerationResult::new(item, &output);
                self.store
                    .update_status(item.id, &StatusUpdate::Completed(output))
                    .await?;

                metrics::counter!("work_items_completed_total", "kind" => item.kind.to_string())
                    .increment(1);
                tracing::info!(item_id = %item.id, output = %result.output, "Work item completed");
                Ok(ItemOutcome::Succeeded(result))
            }
            Err(failure) => {
                let message = failure.to_string();
                tracing::error!(item_id = %item.id, error = %message, "Work item failed");

                self.store
                    .update_status(item.id, &StatusUpdate::Failed(message))
                    .await?;

                metrics::counter!("work_items_failed_total", "kind" => item.kind.to_string())
                    .increment(1);
                Ok(ItemOutcome::Failed(failure))
            }
        }
    }

    /// Run inference and, for images, persist the artifact.
    async fn produce(&self, item: &WorkItem) -> Result<ItemOutput, ItemFailure> {
        let input = InferenceInput::for_item(item);

        let start = Instant::now();
        let output = self.engine.infer(&input).await;
        let elapsed = start.elapsed();

        metrics::histogram!("inference_duration_seconds", "kind" => item.kind.to_string())
            .record(elapsed.as_secs_f64());
        tracing::debug!(
            item_id = %item.id,
            inference_ms = elapsed.as_millis() as u64,
            "Inference finished"
        );

        match (item.kind, output?) {
            (WorkKind::Caption, InferenceOutput::Caption { text, confidence }) => {
                Ok(ItemOutput::Caption { text, confidence })
            }
            (WorkKind::Generate, InferenceOutput::Image {
                bytes,
                content_type,
            }) => {
                let sink = self.sink.as_ref().ok_or(ItemFailure::MissingSink)?;
                let name = artifact_name(item, &content_type);
                let url = sink.store(&bytes, &name, &content_type).await?;
                Ok(ItemOutput::Image { url })
            }
            (kind, InferenceOutput::Caption { .. }) => Err(ItemFailure::UnexpectedOutput {
                kind,
                produced: "caption",
            }),
            (kind, InferenceOutput::Image { .. }) => Err(ItemFailure::UnexpectedOutput {
                kind,
                produced: "image",
            }),
        }
    }
}
