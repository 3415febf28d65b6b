use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::work_item::{ItemOutput, WorkItem};

/// Summary of one successfully processed item, reported back to the caller
/// and in the completion notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationResult {
    pub item_id: Uuid,
    /// Image path for captions, prompt text for generations.
    pub input_summary: String,
    /// Caption text or artifact URL.
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl GenerationResult {
    pub fn new(item: &WorkItem, output: &ItemOutput) -> Self {
        Self {
            item_id: item.id,
            input_summary: item.input.clone(),
            output: output.summary().to_string(),
            confidence: output.confidence(),
        }
    }
}

/// Bookkeeping for one pipeline invocation. Never persisted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchRun {
    pub selected: Vec<Uuid>,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<GenerationResult>,
}

impl BatchRun {
    pub fn new(selected: Vec<Uuid>) -> Self {
        Self {
            selected,
            ..Default::default()
        }
    }

    pub fn record_success(&mut self, result: GenerationResult) {
        self.attempted += 1;
        self.succeeded += 1;
        self.results.push(result);
    }

    pub fn record_failure(&mut self) {
        self.attempted += 1;
        self.failed += 1;
    }

    pub fn total_items(&self) -> usize {
        self.selected.len()
    }
}
