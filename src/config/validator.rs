use crate::config::{Config, SeedEntry};
use crate::error::{Error, Result};
use crate::registry::LaunchMode;
use std::collections::HashSet;

/// Validates a single seed entry
pub fn validate_seed_entry(seed: &SeedEntry) -> Result<()> {
    if seed.id.trim().is_empty() {
        return Err(Error::ConfigInvalid("Seed entry has an empty id".to_string()));
    }

    if seed.server.port == Some(0) {
        return Err(Error::ConfigInvalid(format!(
            "Server '{}' has port 0",
            seed.id
        )));
    }

    if let Some(command) = &seed.server.command {
        let parts = shell_words::split(command).map_err(|e| {
            Error::ConfigInvalid(format!("Server '{}' has an invalid command: {}", seed.id, e))
        })?;
        if parts.is_empty() {
            return Err(Error::ConfigInvalid(format!(
                "Server '{}' has an empty command",
                seed.id
            )));
        }
    }

    if seed.server.mode == LaunchMode::Ssh && seed.server.host.is_none() {
        return Err(Error::ConfigInvalid(format!(
            "SSH server '{}' has no host",
            seed.id
        )));
    }

    Ok(())
}

/// Full configuration validation
pub fn validate_config(config: &Config) -> Result<()> {
    if config.registry_path.as_os_str().is_empty() {
        return Err(Error::ConfigInvalid("Registry path is empty".to_string()));
    }

    if config.ssh.client.trim().is_empty() {
        return Err(Error::ConfigInvalid("SSH client is empty".to_string()));
    }

    if config.ssh.default_port == 0 {
        return Err(Error::ConfigInvalid("SSH default port is 0".to_string()));
    }

    let mut seen = HashSet::new();
    for seed in &config.seed {
        validate_seed_entry(seed)?;
        if !seen.insert(seed.id.as_str()) {
            return Err(Error::ConfigInvalid(format!(
                "Seed id '{}' appears more than once",
                seed.id
            )));
        }
    }

    Ok(())
}
