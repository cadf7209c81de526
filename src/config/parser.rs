use crate::error::{Error, Result};
use crate::registry::{LaunchMode, ServerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the registry document.
pub const DEFAULT_REGISTRY_PATH: &str = "servers.json";

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "server-manager.json";

/// An entry created when the registry document does not exist yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedEntry {
    /// Registry id of the seeded entry
    pub id: String,
    /// Its declared configuration
    #[serde(flatten)]
    pub server: ServerConfig,
}

/// SSH client settings.
///
/// # Examples
///
/// ```
/// use server_manager::config::SshConfig;
///
/// let ssh = SshConfig::default();
/// assert_eq!(ssh.client, "ssh");
/// assert_eq!(ssh.default_port, 22);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SshConfig {
    /// Client binary, looked up on `PATH`
    pub client: String,
    /// User for targets given without `user@`
    pub default_user: String,
    /// Port for targets given without `:port`
    pub default_port: u16,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            client: "ssh".to_string(),
            default_user: "root".to_string(),
            default_port: 22,
        }
    }
}

/// Main configuration for Server Manager.
///
/// Every field has a default, so an empty object (or no file at all) is a
/// valid configuration.
///
/// # JSON Schema
///
/// ```json
/// {
///   "registryPath": "servers.json",
///   "stopGracePeriodMs": 3000,
///   "restartDelayMs": 1000,
///   "checkPortBeforeStart": true,
///   "logDir": "logs",
///   "ssh": { "client": "ssh", "defaultUser": "root", "defaultPort": 22 },
///   "seed": [
///     {
///       "id": "server-10-0-0-38",
///       "name": "Server 10.0.0.38",
///       "port": 8080,
///       "command": "python3 server_10_0_0_38.py",
///       "description": "Demo web server and SSH host",
///       "mode": "ssh",
///       "host": "10.0.0.38"
///     }
///   ]
/// }
/// ```
///
/// # Examples
///
/// ```
/// use server_manager::config::Config;
///
/// let config = Config::parse_from_str(r#"{ "stopGracePeriodMs": 500 }"#).unwrap();
/// assert_eq!(config.stop_grace_period().as_millis(), 500);
/// assert_eq!(config.registry_path.to_str(), Some("servers.json"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Registry document location
    pub registry_path: PathBuf,
    /// How long `stop` waits after SIGTERM before SIGKILL
    pub stop_grace_period_ms: u64,
    /// Pause between the stop and start phases of `restart`
    pub restart_delay_ms: u64,
    /// Refuse to start an entry whose port already accepts connections
    pub check_port_before_start: bool,
    /// Directory receiving `<id>.log` output of started processes
    pub log_dir: Option<PathBuf>,
    /// SSH client settings
    pub ssh: SshConfig,
    /// Entries created on first run
    pub seed: Vec<SeedEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry_path: PathBuf::from(DEFAULT_REGISTRY_PATH),
            stop_grace_period_ms: 3000,
            restart_delay_ms: 1000,
            check_port_before_start: true,
            log_dir: None,
            ssh: SshConfig::default(),
            seed: vec![default_seed()],
        }
    }
}

/// The demo host bundled with the tool.
fn default_seed() -> SeedEntry {
    SeedEntry {
        id: "server-10-0-0-38".to_string(),
        server: ServerConfig {
            name: "Server 10.0.0.38".to_string(),
            port: Some(8080),
            command: Some("python3 server_10_0_0_38.py".to_string()),
            description: "Demo web server and SSH host".to_string(),
            mode: LaunchMode::Ssh,
            host: Some("10.0.0.38".to_string()),
            working_directory: None,
            auto_start: false,
        },
    }
}

impl Config {
    /// Loads a configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be read
    /// * The file contents are not valid JSON
    /// * The JSON does not conform to the expected schema
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        Self::parse_from_str(&content)
    }

    /// Loads a configuration file if it exists, defaults otherwise.
    pub fn from_file_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!(path = ?path, "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Parses a configuration from a JSON string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse JSON config: {}", e)))
    }

    /// Grace period between SIGTERM and SIGKILL.
    pub fn stop_grace_period(&self) -> Duration {
        Duration::from_millis(self.stop_grace_period_ms)
    }

    /// Pause between restart phases.
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        let config = Config::parse_from_str("{}").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_seed() {
        let config_str = r#"{
            "registryPath": "/var/lib/server-manager/servers.json",
            "seed": [
                { "id": "api", "name": "API", "port": 9000, "command": "./api --port 9000" }
            ]
        }"#;

        let config = Config::parse_from_str(config_str).unwrap();

        assert_eq!(config.seed.len(), 1);
        let seed = &config.seed[0];
        assert_eq!(seed.id, "api");
        assert_eq!(seed.server.port, Some(9000));
        assert_eq!(seed.server.mode, LaunchMode::Process);
        assert_eq!(config.ssh, SshConfig::default());
    }

    #[test]
    fn test_default_seeds_demo_host() {
        let config = Config::default();
        assert_eq!(config.seed[0].id, "server-10-0-0-38");
        assert_eq!(config.seed[0].server.mode, LaunchMode::Ssh);
    }
}
