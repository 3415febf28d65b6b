use chrono::{DateTime, Utc};
use serde::Serialize;

use super::generation::{BatchRun, GenerationResult};
use super::work_item::WorkKind;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Completed,
    Error,
}

/// Counts and results attached to a completed run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunSummary {
    pub kind: WorkKind,
    pub total_items: usize,
    pub processed_count: usize,
    pub error_count: usize,
    pub dataset_id: Option<String>,
    pub model_id: String,
    pub model_config_id: Option<String>,
    pub results: Vec<GenerationResult>,
}

/// Body POSTed to the callback URL.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NotificationPayload {
    pub status: NotificationStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub details: Option<RunSummary>,
}

impl NotificationPayload {
    pub fn completed(
        run: &BatchRun,
        kind: WorkKind,
        dataset_id: Option<&str>,
        model_id: &str,
        model_config_id: Option<&str>,
    ) -> Self {
        Self {
            status: NotificationStatus::Completed,
            message: format!("Processed {} items ({} errors)", run.succeeded, run.failed),
            timestamp: Utc::now(),
            details: Some(RunSummary {
                kind,
                total_items: run.total_items(),
                processed_count: run.succeeded,
                error_count: run.failed,
                dataset_id: dataset_id.map(str::to_string),
                model_id: model_id.to_string(),
                model_config_id: model_config_id.map(str::to_string),
                results: run.results.clone(),
            }),
        }
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            status: NotificationStatus::Error,
            message: format!("Application error: {}", message),
            timestamp: Utc::now(),
            details: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_payload_flattens_counts() {
        let mut run = BatchRun::new(vec![uuid::Uuid::new_v4(), uuid::Uuid::new_v4()]);
        run.record_failure();
        run.record_failure();

        let payload = NotificationPayload::completed(
            &run,
            WorkKind::Caption,
            Some("ds-1"),
            "@cf/llava-hf/llava-1.5-7b-hf",
            Some("llava-default"),
        );
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["status"], "completed");
        assert_eq!(json["message"], "Processed 0 items (2 errors)");
        assert_eq!(json["total_items"], 2);
        assert_eq!(json["processed_count"], 0);
        assert_eq!(json["error_count"], 2);
        assert_eq!(json["dataset_id"], "ds-1");
        assert_eq!(json["kind"], "caption");
        assert_eq!(json["model_config_id"], "llava-default");
        assert!(json["results"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_error_payload_has_no_details() {
        let payload = NotificationPayload::error("connection refused");
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "Application error: connection refused");
        assert!(json.get("processed_count").is_none());
    }
}
