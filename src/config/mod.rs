// src/config/mod.rs

//! Pipeline definition loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a definition from disk (`loader.rs`).
//! - Validate it before the engine sees it (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{ConfigFile, ConfigSection, NodeConfig, RawConfigFile, TestConfig};
pub use validate::validate_config;
