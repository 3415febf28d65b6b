use garde::Validate;
use serde::Deserialize;
use strum::Display;

use crate::models::work_item::WorkKind;

/// Where the operator would like inference to run.
#[derive(Debug, Clone, Copy, Default, Deserialize, Display, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DevicePreference {
    #[default]
    Auto,
    Gpu,
    Cpu,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// PostgreSQL connection string for the work item store
    #[garde(length(min = 1))]
    pub database_url: String,

    /// How long to wait for a store connection before giving up
    #[serde(default = "default_db_connect_timeout_secs")]
    #[garde(range(min = 1))]
    pub db_connect_timeout_secs: u64,

    /// Which kind of work item this process handles
    #[serde(default = "default_work_kind")]
    #[garde(skip)]
    pub work_kind: WorkKind,

    /// Restrict runs to items of one dataset
    #[garde(length(min = 1))]
    pub dataset_id: Option<String>,

    /// Callback URL notified once per batch
    #[garde(length(min = 1))]
    pub callback_url: Option<String>,

    #[serde(default = "default_callback_timeout_secs")]
    #[garde(range(min = 1))]
    pub callback_timeout_secs: u64,

    /// Send a completion notification even when a run selected nothing
    #[serde(default)]
    #[garde(skip)]
    pub notify_on_empty: bool,

    /// Maximum number of items per run
    #[serde(default = "default_batch_size")]
    #[garde(range(min = 1))]
    pub batch_size: u32,

    /// Workers AI model; falls back to the default for `work_kind`
    #[garde(length(min = 1))]
    pub model_id: Option<String>,

    /// Row of `model_configs` to run with; the kind's default row when unset
    #[garde(length(min = 1))]
    pub model_config_id: Option<String>,

    #[serde(default)]
    #[garde(skip)]
    pub device: DevicePreference,

    /// Cloudflare account ID
    #[garde(length(min = 1))]
    pub cf_account_id: String,

    /// Cloudflare Workers AI API token
    #[garde(length(min = 1))]
    pub cf_api_token: String,

    /// Workers AI REST base URL
    #[serde(default = "default_inference_base_url")]
    #[garde(length(min = 1))]
    pub inference_base_url: String,

    #[serde(default = "default_inference_timeout_secs")]
    #[garde(range(min = 1))]
    pub inference_timeout_secs: u64,

    /// Diffusion steps for image generation (Workers AI caps SDXL at 20)
    #[serde(default = "default_num_inference_steps")]
    #[garde(range(min = 1, max = 20))]
    pub num_inference_steps: u32,

    #[serde(default = "default_max_caption_tokens")]
    #[garde(range(min = 1, max = 2048))]
    pub max_caption_tokens: u32,

    /// R2 bucket name (required for image generation)
    #[garde(length(min = 1))]
    pub r2_bucket: Option<String>,

    /// R2 endpoint URL
    #[garde(length(min = 1))]
    pub r2_endpoint: Option<String>,

    /// R2 access key ID (S3-compatible)
    #[garde(length(min = 1))]
    pub r2_access_key: Option<String>,

    /// R2 secret access key (S3-compatible)
    #[garde(length(min = 1))]
    pub r2_secret_key: Option<String>,

    /// Key prefix for generated artifacts
    #[serde(default = "default_artifact_prefix")]
    #[garde(length(min = 1))]
    pub artifact_prefix: String,

    /// Public base URL for artifacts; references use `s3://` when unset
    #[garde(length(min = 1))]
    pub artifact_public_url: Option<String>,

    /// Sleep between empty polls (worker binary only)
    #[serde(default = "default_poll_interval_secs")]
    #[garde(range(min = 1))]
    pub poll_interval_secs: u64,

    /// Health/metrics bind address (worker binary only)
    #[garde(length(min = 1))]
    pub bind_addr: Option<String>,
}

/// R2 settings, present only when all four variables are set.
#[derive(Debug, Clone)]
pub struct R2Settings {
    pub bucket: String,
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
}

fn default_work_kind() -> WorkKind {
    WorkKind::Caption
}

fn default_db_connect_timeout_secs() -> u64 {
    10
}

fn default_callback_timeout_secs() -> u64 {
    10
}

fn default_batch_size() -> u32 {
    10
}

fn default_inference_base_url() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

fn default_inference_timeout_secs() -> u64 {
    120
}

fn default_num_inference_steps() -> u32 {
    20
}

fn default_max_caption_tokens() -> u32 {
    50
}

fn default_artifact_prefix() -> String {
    "generated".to_string()
}

fn default_poll_interval_secs() -> u64 {
    30
}

impl AppConfig {
    /// Load from `.env` and the process environment, then validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.check()?;
        Ok(config)
    }

    /// Field rules plus the rules that span several fields.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;

        if let Some(url) = &self.callback_url {
            require_http_url("CALLBACK_URL", url)?;
        }
        require_http_url("INFERENCE_BASE_URL", &self.inference_base_url)?;

        if self.work_kind == WorkKind::Generate && self.r2_settings().is_none() {
            return Err(ConfigError::Invalid(
                "image generation requires R2_BUCKET, R2_ENDPOINT, R2_ACCESS_KEY and R2_SECRET_KEY"
                    .to_string(),
            ));
        }

        Ok(())
    }

    pub fn model_id(&self) -> &str {
        self.model_id
            .as_deref()
            .unwrap_or_else(|| self.work_kind.default_model())
    }

    pub fn r2_settings(&self) -> Option<R2Settings> {
        Some(R2Settings {
            bucket: self.r2_bucket.clone()?,
            endpoint: self.r2_endpoint.clone()?,
            access_key: self.r2_access_key.clone()?,
            secret_key: self.r2_secret_key.clone()?,
        })
    }
}

fn require_http_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(value)
        .map_err(|e| ConfigError::Invalid(format!("{} is not a valid URL: {}", name, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid(format!(
            "{} must use http or https, got {}",
            name, other
        ))),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] garde::Report),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
