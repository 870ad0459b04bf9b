//! Pipeline Triage - Backend Library
//!
//! Ingests CI pipeline/job webhooks, collects deterministic evidence at the
//! failing commit, optionally consults a language model, and files
//! deduplicated issues on the code host.

#[macro_use]
mod macros;

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod retry;
pub mod services;
pub mod telemetry;

pub use config::Config;
pub use error::{AppError, Result};
