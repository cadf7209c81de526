//! Registry module for Server Manager.
//!
//! The registry is the persisted mapping of server id to declared
//! configuration and status. This module holds the data model, the
//! `RegistryStore` persistence contract with its JSON file implementation,
//! and helpers for timestamped backups.
//!
//! # Examples
//!
//! ```no_run
//! use server_manager::registry::{JsonFileStore, RegistryStore};
//!
//! let store = JsonFileStore::new("servers.json");
//! let entries = store.load().unwrap();
//! println!("{} servers registered", entries.len());
//! store.save(&entries).unwrap();
//! ```
pub mod backup;
mod entry;
mod store;

pub use entry::{LaunchMode, ServerConfig, ServerEntry, ServerStatus};
pub use store::{JsonFileStore, RegistryStore};

#[cfg(test)]
pub use store::MockRegistryStore;
