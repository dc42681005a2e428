//! NB-IoT eNB configuration management
//!
//! This crate provides configuration loading and validation for the eNB stack:
//! - Stack configuration structures (cell, MAC, HARQ, SPS)
//! - TOML configuration file parsing
//! - Configuration errors

pub mod error;
pub mod stack_config;
pub mod toml_config;

pub use error::ConfigError;
pub use stack_config::*;
pub use toml_config::*;
