//! Configuration management for LLMTV.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only changed section is modified)
//! - Validation on load with automatic defaults
//!
//! # Example
//!
//! ```no_run
//! use llmtv_core::config::{ConfigManager, ConfigSection};
//!
//! // Create manager and load (or create default) config
//! let mut config = ConfigManager::new(".config/llmtv.toml");
//! config.load_or_create().unwrap();
//!
//! // Read settings
//! println!("Output folder: {}", config.settings().paths.output_folder);
//!
//! // Modify a setting
//! config.settings_mut().clips.max_concurrent = 2;
//!
//! // Save just the clips section atomically
//! config.update_section(ConfigSection::Clips).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    AssemblySettings, CacheSettings, ClipSettings, ConfigSection, LoggingSettings, PathSettings,
    RetryPolicy, ServiceSettings, Settings, TimingSettings,
};
