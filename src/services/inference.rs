use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Semaphore;

use super::image_input;
use crate::config::{AppConfig, DevicePreference};
use crate::models::model_config::ModelSelection;
use crate::models::work_item::{WorkItem, WorkKind};

const CAPTION_PROMPT: &str = "Describe this image in one short sentence.";

/// What the model is asked to work on.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceInput {
    /// Path or URL of an image to caption.
    ImageRef(String),
    /// Prompt to render.
    Prompt(String),
}

impl InferenceInput {
    pub fn for_item(item: &WorkItem) -> Self {
        match item.kind {
            WorkKind::Caption => InferenceInput::ImageRef(item.input.clone()),
            WorkKind::Generate => InferenceInput::Prompt(item.input.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutput {
    Caption {
        text: String,
        confidence: Option<f64>,
    },
    Image {
        bytes: Vec<u8>,
        content_type: String,
    },
}

/// A loaded model. Calls are exclusive: implementations must not run two
/// inferences at once.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    fn model_id(&self) -> &str;

    async fn infer(&self, input: &InferenceInput) -> Result<InferenceOutput, InferenceError>;

    /// Free the model. Later calls to `infer` fail.
    async fn release(&self) {}
}

/// Connection and generation settings for [`WorkersAiClient`].
#[derive(Debug, Clone)]
pub struct WorkersAiSettings {
    pub base_url: String,
    pub account_id: String,
    pub api_token: String,
    pub model_id: String,
    pub device: DevicePreference,
    pub timeout: Duration,
    pub max_caption_tokens: u32,
    pub num_inference_steps: u32,
}

impl WorkersAiSettings {
    pub fn from_config(config: &AppConfig, selection: &ModelSelection) -> Self {
        Self {
            base_url: config.inference_base_url.clone(),
            account_id: config.cf_account_id.clone(),
            api_token: config.cf_api_token.clone(),
            model_id: selection.model_id.clone(),
            device: selection.device,
            timeout: Duration::from_secs(config.inference_timeout_secs),
            max_caption_tokens: config.max_caption_tokens,
            num_inference_steps: config.num_inference_steps,
        }
    }
}

#[derive(Deserialize)]
struct CaptionResponse {
    result: CaptionResult,
}

#[derive(Deserialize)]
struct CaptionResult {
    description: String,
}

/// Client for Cloudflare Workers AI, serving both LLaVA captioning and
/// Stable Diffusion image generation.
pub struct WorkersAiClient {
    http: Client,
    settings: WorkersAiSettings,
    gate: Semaphore,
}

impl WorkersAiClient {
    pub fn new(settings: WorkersAiSettings) -> Result<Self, InferenceError> {
        let http = Client::builder().timeout(settings.timeout).build()?;

        tracing::info!(model = %settings.model_id, "Loading Workers AI model");
        match settings.device {
            DevicePreference::Cpu => tracing::warn!(
                "CPU inference requested but Workers AI schedules its own accelerators; continuing on hosted GPU"
            ),
            DevicePreference::Gpu | DevicePreference::Auto => {
                tracing::info!(device = %settings.device, "Using hosted GPU inference")
            }
        }

        Ok(Self {
            http,
            settings,
            gate: Semaphore::new(1),
        })
    }

    fn run_url(&self) -> String {
        format!(
            "{}/accounts/{}/ai/run/{}",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.account_id,
            self.settings.model_id
        )
    }

    async fn caption(&self, reference: &str) -> Result<InferenceOutput, InferenceError> {
        let image_bytes = image_input::load_image(&self.http, reference).await?;

        let request_body = serde_json::json!({
            "image": base64::engine::general_purpose::STANDARD.encode(&image_bytes),
            "prompt": CAPTION_PROMPT,
            "max_tokens": self.settings.max_caption_tokens
        });

        let response = self
            .http
            .post(self.run_url())
            .bearer_auth(&self.settings.api_token)
            .json(&request_body)
            .send()
            .await?;

        let body = ensure_success(response).await?.text().await?;
        let parsed: CaptionResponse = serde_json::from_str(&body)?;

        let text = parsed.result.description.trim().to_string();
        if text.is_empty() {
            return Err(InferenceError::EmptyOutput);
        }

        Ok(InferenceOutput::Caption {
            text,
            confidence: None,
        })
    }

    async fn generate(&self, prompt: &str) -> Result<InferenceOutput, InferenceError> {
        let request_body = serde_json::json!({
            "prompt": prompt,
            "num_steps": self.settings.num_inference_steps
        });

        let response = self
            .http
            .post(self.run_url())
            .bearer_auth(&self.settings.api_token)
            .json(&request_body)
            .send()
            .await?;

        let bytes = ensure_success(response).await?.bytes().await?.to_vec();
        if bytes.is_empty() {
            return Err(InferenceError::EmptyOutput);
        }

        let format = image::guess_format(&bytes)?;

        Ok(InferenceOutput::Image {
            bytes,
            content_type: format.to_mime_type().to_string(),
        })
    }
}

#[async_trait]
impl InferenceEngine for WorkersAiClient {
    fn model_id(&self) -> &str {
        &self.settings.model_id
    }

    async fn infer(&self, input: &InferenceInput) -> Result<InferenceOutput, InferenceError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| InferenceError::Released)?;

        match input {
            InferenceInput::ImageRef(reference) => self.caption(reference).await,
            InferenceInput::Prompt(prompt) => self.generate(prompt).await,
        }
    }

    async fn release(&self) {
        self.gate.close();
        tracing::info!(model = %self.settings.model_id, "Released Workers AI model");
    }
}

async fn ensure_success(response: Response) -> Result<Response, InferenceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(InferenceError::Api {
        status: status.as_u16(),
        body,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Workers AI returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse model response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to read image {path}: {source}")]
    ImageRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid image data: {0}")]
    Image(#[from] image::ImageError),

    #[error("Model returned an empty result")]
    EmptyOutput,

    #[error("Model has been released")]
    Released,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> WorkersAiSettings {
        WorkersAiSettings {
            base_url: "https://api.cloudflare.com/client/v4/".to_string(),
            account_id: "acct".to_string(),
            api_token: "token".to_string(),
            model_id: WorkKind::Caption.default_model().to_string(),
            device: DevicePreference::Auto,
            timeout: Duration::from_secs(5),
            max_caption_tokens: 50,
            num_inference_steps: 20,
        }
    }

    #[test]
    fn test_run_url_trims_trailing_slash() {
        let client = WorkersAiClient::new(settings()).unwrap();
        assert_eq!(
            client.run_url(),
            "https://api.cloudflare.com/client/v4/accounts/acct/ai/run/@cf/llava-hf/llava-1.5-7b-hf"
        );
    }

    #[test]
    fn test_input_follows_item_kind() {
        let caption = WorkItem::pending(WorkKind::Caption, "a.jpg", None);
        let generate = WorkItem::pending(WorkKind::Generate, "a red fox", None);

        assert_eq!(
            InferenceInput::for_item(&caption),
            InferenceInput::ImageRef("a.jpg".to_string())
        );
        assert_eq!(
            InferenceInput::for_item(&generate),
            InferenceInput::Prompt("a red fox".to_string())
        );
    }

    #[tokio::test]
    async fn test_released_engine_refuses_work() {
        let client = WorkersAiClient::new(settings()).unwrap();
        client.release().await;

        let err = client
            .infer(&InferenceInput::Prompt("anything".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Released));
    }
}
