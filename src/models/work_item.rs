use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle of a work item in the store.
///
/// `Pending` is the only non-terminal state. Items never return to it on their own.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkStatus {
    Pending,
    Completed,
    Error,
}

impl WorkStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, WorkStatus::Pending)
    }
}

/// What a work item asks for. A pipeline instance only ever selects one kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkKind {
    /// Describe an image (input is a path or URL).
    Caption,
    /// Render an image from a text prompt.
    Generate,
}

impl WorkKind {
    /// Default Workers AI model for this kind of work.
    pub fn default_model(self) -> &'static str {
        match self {
            WorkKind::Caption => "@cf/llava-hf/llava-1.5-7b-hf",
            WorkKind::Generate => "@cf/stabilityai/stable-diffusion-xl-base-1.0",
        }
    }
}

/// Output recorded on a completed item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemOutput {
    Caption {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        confidence: Option<f64>,
    },
    Image {
        url: String,
    },
}

impl ItemOutput {
    /// Caption text or artifact reference.
    pub fn summary(&self) -> &str {
        match self {
            ItemOutput::Caption { text, .. } => text,
            ItemOutput::Image { url } => url,
        }
    }

    pub fn confidence(&self) -> Option<f64> {
        match self {
            ItemOutput::Caption { confidence, .. } => *confidence,
            ItemOutput::Image { .. } => None,
        }
    }
}

/// A terminal transition. Carrying the payload in the variant keeps `result` and
/// `error` mutually exclusive.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Completed(ItemOutput),
    Failed(String),
}

impl StatusUpdate {
    pub fn status(&self) -> WorkStatus {
        match self {
            StatusUpdate::Completed(_) => WorkStatus::Completed,
            StatusUpdate::Failed(_) => WorkStatus::Error,
        }
    }
}

/// A persisted unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub kind: WorkKind,
    pub input: String,
    pub status: WorkStatus,
    pub dataset_id: Option<String>,
    pub result: Option<ItemOutput>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    /// Build a fresh pending item, as an upstream producer would.
    pub fn pending(kind: WorkKind, input: impl Into<String>, dataset_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            input: input.into(),
            status: WorkStatus::Pending,
            dataset_id,
            result: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
            error_at: None,
        }
    }

    /// Apply a terminal transition in place, stamping the status-named timestamp.
    pub fn apply(&mut self, update: &StatusUpdate, at: DateTime<Utc>) {
        self.status = update.status();
        match update {
            StatusUpdate::Completed(output) => {
                self.result = Some(output.clone());
                self.error = None;
                self.error_at = None;
                self.completed_at = Some(at);
            }
            StatusUpdate::Failed(message) => {
                self.error = Some(message.clone());
                self.result = None;
                self.completed_at = None;
                self.error_at = Some(at);
            }
        }
    }
}
