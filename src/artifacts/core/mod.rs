//! Shared types used across the engine
//!
//! - `error`: typed error kinds surfaced through `anyhow::Error`
//! - `settings`: per-repository tunables (rename detection, default author)

pub mod error;
pub mod settings;
