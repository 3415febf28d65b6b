//! Media generation worker
//!
//! Drains pending work items from Postgres in bounded batches: images are
//! captioned and prompts are rendered with Cloudflare Workers AI, generated
//! images land in R2, and each run can be reported to a callback URL.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod services;
pub mod telemetry;
