//! Resolves the image referenced by a caption work item.
//!
//! A reference is either an `http(s)://` URL or a local filesystem path. Whatever
//! the source format, the image is re-encoded as RGB PNG before it reaches the model.

use image::{DynamicImage, ImageFormat};
use reqwest::Client;
use std::io::Cursor;

use super::inference::InferenceError;

pub fn is_remote(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// Read raw bytes for an image reference.
pub async fn fetch_bytes(http: &Client, reference: &str) -> Result<Vec<u8>, InferenceError> {
    if is_remote(reference) {
        let response = http.get(reference).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    } else {
        tokio::fs::read(reference)
            .await
            .map_err(|source| InferenceError::ImageRead {
                path: reference.to_string(),
                source,
            })
    }
}

/// Decode any supported format and re-encode as an RGB PNG.
pub fn normalize_to_png(bytes: &[u8]) -> Result<Vec<u8>, InferenceError> {
    let decoded = image::load_from_memory(bytes)?;
    let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());

    let mut out = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
    Ok(out)
}

/// Fetch and normalize in one step.
pub async fn load_image(http: &Client, reference: &str) -> Result<Vec<u8>, InferenceError> {
    let raw = fetch_bytes(http, reference).await?;
    normalize_to_png(&raw)
}
