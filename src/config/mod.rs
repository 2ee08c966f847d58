//! Configuration management
//!
//! Supports:
//! - User-level config (~/.config/qe-clean/config.toml)
//! - Run-level config (./qe-clean.toml or `--config PATH`)

mod user_config;

pub use user_config::{Config, LmConfig, ToolsConfig};
