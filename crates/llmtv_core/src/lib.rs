//! LLMTV Core - Backend logic for the LLMTV music video generator
//!
//! This crate contains the whole generation pipeline with zero UI
//! dependencies. It can be used by the CLI, a GUI, or tests driving it
//! with stub collaborators.

pub mod assembler;
pub mod cache;
pub mod config;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod producer;
pub mod services;
pub mod timing;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
