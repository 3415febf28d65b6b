//! Work item fixtures

#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use mediagen_worker::models::work_item::{WorkItem, WorkKind};
use mediagen_worker::pipeline::PipelineSettings;
use std::io::Cursor;

pub fn caption_item(path: &str) -> WorkItem {
    WorkItem::pending(WorkKind::Caption, path, None)
}

pub fn caption_item_in(path: &str, dataset_id: &str) -> WorkItem {
    WorkItem::pending(WorkKind::Caption, path, Some(dataset_id.to_string()))
}

pub fn prompt_item(prompt: &str) -> WorkItem {
    WorkItem::pending(WorkKind::Generate, prompt, None)
}

pub fn settings(kind: WorkKind, batch_size: u32) -> PipelineSettings {
    PipelineSettings {
        kind,
        scope: None,
        batch_size,
        notify_on_empty: false,
        model_config_id: None,
    }
}

/// Small solid-color PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([220, 30, 30]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode png");
    buf
}

/// Small solid-color JPEG.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([30, 30, 220]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .expect("encode jpeg");
    buf
}

pub const PROMPTS: &[&str] = &[
    "a lighthouse on a cliff at dusk, oil painting",
    "a red fox curled up in fresh snow",
    "isometric pixel art of a tiny bakery",
];
