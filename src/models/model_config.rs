use crate::config::{AppConfig, DevicePreference};
use crate::models::work_item::WorkKind;

/// Row of the `model_configs` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub id: String,
    pub kind: WorkKind,
    pub model_name: String,
    pub use_gpu: Option<bool>,
    pub batch_size: Option<i32>,
    pub is_default: bool,
}

/// Model, device and batch size a pipeline runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model_id: String,
    pub device: DevicePreference,
    pub batch_size: u32,
    /// Stored configuration the selection came from, if any.
    pub config_id: Option<String>,
}

impl ModelSelection {
    /// Stored values win; anything the row leaves unset comes from the environment.
    pub fn resolve(config: &AppConfig, stored: Option<&ModelConfig>) -> Self {
        let mut selection = Self {
            model_id: config.model_id().to_string(),
            device: config.device,
            batch_size: config.batch_size,
            config_id: None,
        };

        if let Some(stored) = stored {
            selection.model_id = stored.model_name.clone();
            if let Some(use_gpu) = stored.use_gpu {
                selection.device = if use_gpu {
                    DevicePreference::Gpu
                } else {
                    DevicePreference::Cpu
                };
            }
            if let Some(batch_size) = stored
                .batch_size
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
            {
                selection.batch_size = batch_size;
            }
            selection.config_id = Some(stored.id.clone());
        }

        selection
    }
}
