//! Configuration module for Server Manager.
//!
//! This module handles parsing, validation, and access to the tool's own
//! settings: where the registry lives, how long `stop` waits before
//! escalating, SSH client defaults and the entries seeded on first run.
//! Configuration is JSON and every field is optional.
//!
//! # Examples
//!
//! Loading a configuration from a file:
//!
//! ```no_run
//! use server_manager::config::Config;
//!
//! let config = Config::from_file("server-manager.json").unwrap();
//! println!("Registry at {}", config.registry_path.display());
//! ```
//!
//! Creating a configuration programmatically:
//!
//! ```
//! use server_manager::config::{Config, validate_config};
//!
//! let config = Config {
//!     stop_grace_period_ms: 500,
//!     seed: Vec::new(),
//!     ..Config::default()
//! };
//! validate_config(&config).unwrap();
//! ```
mod parser;
pub mod validator;

pub use parser::{Config, DEFAULT_CONFIG_PATH, DEFAULT_REGISTRY_PATH, SeedEntry, SshConfig};
pub use validator::validate_config;
