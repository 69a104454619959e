//! Library crate for v6probe exposing reusable modules.
pub mod config;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod probe;
pub mod redact;
pub mod render;
pub mod report;
pub mod sink;
pub mod targets;
pub mod types;
