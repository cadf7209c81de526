use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

/// Declared status of a registry entry.
///
/// Only trusted after reconciliation against the process table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    /// A process was started and its pid recorded
    #[serde(alias = "running")]
    Online,
    /// Nothing is running for this entry
    #[default]
    #[serde(alias = "stopped")]
    Offline,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerStatus::Online => write!(f, "online"),
            ServerStatus::Offline => write!(f, "offline"),
        }
    }
}

/// How an entry is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    /// A local process started from `command`
    #[default]
    Process,
    /// A remote host reached over SSH; `command`, if set, still runs locally
    Ssh,
}

impl LaunchMode {
    fn is_process(&self) -> bool {
        *self == LaunchMode::Process
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Declared configuration of a server, as supplied to `add`.
///
/// # Examples
///
/// ```
/// use server_manager::registry::ServerConfig;
///
/// let config = ServerConfig {
///     name: "Demo web server".to_string(),
///     port: Some(8080),
///     command: Some("python3 server_10_0_0_38.py".to_string()),
///     ..ServerConfig::default()
/// };
/// assert!(config.host.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Human readable label
    #[serde(default)]
    pub name: String,
    /// Informational port; also used for the port-in-use check on start
    #[serde(default)]
    pub port: Option<u16>,
    /// Command line used to start the process
    #[serde(default)]
    pub command: Option<String>,
    /// Free text
    #[serde(default)]
    pub description: String,
    /// Process or SSH target
    #[serde(default, skip_serializing_if = "LaunchMode::is_process")]
    pub mode: LaunchMode,
    /// SSH address for `mode = ssh` entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Directory the command runs in; the manager's cwd when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
    /// Start this entry when the shell opens
    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_start: bool,
}

/// One managed server record in the registry.
///
/// The `id` is the registry key and is not part of the serialized record.
/// Fields this version does not know about are kept in `extra` and written
/// back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEntry {
    /// Registry key
    #[serde(skip)]
    pub id: String,
    /// Human readable label
    #[serde(default)]
    pub name: String,
    /// Informational port
    #[serde(default)]
    pub port: Option<u16>,
    /// Command line used to start the process
    #[serde(default)]
    pub command: Option<String>,
    /// Free text
    #[serde(default)]
    pub description: String,
    /// Declared status
    #[serde(default)]
    pub status: ServerStatus,
    /// Pid of the last started instance
    #[serde(default)]
    pub pid: Option<u32>,
    /// Process or SSH target
    #[serde(default)]
    pub mode: LaunchMode,
    /// SSH address for `mode = ssh` entries
    #[serde(default)]
    pub host: Option<String>,
    /// Directory the command runs in
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    /// Start this entry when the shell opens
    #[serde(default)]
    pub auto_start: bool,
    /// Unknown fields preserved across load/save
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServerEntry {
    /// Create an offline entry from its declared configuration.
    pub fn new(id: impl Into<String>, config: ServerConfig) -> Self {
        Self {
            id: id.into(),
            name: config.name,
            port: config.port,
            command: config.command,
            description: config.description,
            status: ServerStatus::Offline,
            pid: None,
            mode: config.mode,
            host: config.host,
            working_directory: config.working_directory,
            auto_start: config.auto_start,
            extra: Map::new(),
        }
    }

    /// Declared configuration of this entry.
    pub fn config(&self) -> ServerConfig {
        ServerConfig {
            name: self.name.clone(),
            port: self.port,
            command: self.command.clone(),
            description: self.description.clone(),
            mode: self.mode,
            host: self.host.clone(),
            working_directory: self.working_directory.clone(),
            auto_start: self.auto_start,
        }
    }

    /// Whether the entry declares itself online.
    pub fn is_online(&self) -> bool {
        self.status == ServerStatus::Online
    }

    /// Whether the entry has a non-blank launch command.
    pub fn has_command(&self) -> bool {
        self.command.as_deref().is_some_and(|c| !c.trim().is_empty())
    }

    /// An SSH target without a local command.
    pub fn is_ssh_only(&self) -> bool {
        self.mode == LaunchMode::Ssh && !self.has_command()
    }

    /// Label for display: the name, or the id when no name was given.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    pub(crate) fn mark_online(&mut self, pid: u32) {
        self.status = ServerStatus::Online;
        self.pid = Some(pid);
    }

    pub(crate) fn mark_offline(&mut self) {
        self.status = ServerStatus::Offline;
        self.pid = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_legacy_status_values_are_accepted() {
        let entry: ServerEntry = serde_json::from_value(json!({
            "name": "old",
            "port": 3000,
            "command": "node app.js",
            "description": "",
            "status": "running",
            "pid": 42
        }))
        .unwrap();
        assert_eq!(entry.status, ServerStatus::Online);
        assert_eq!(entry.pid, Some(42));
    }

    #[test]
    fn test_unknown_fields_survive() {
        let record = json!({
            "name": "web",
            "port": null,
            "command": null,
            "description": "",
            "status": "offline",
            "pid": null,
            "owner": "ops"
        });
        let entry: ServerEntry = serde_json::from_value(record.clone()).unwrap();
        assert_eq!(entry.extra.get("owner"), Some(&json!("ops")));
        let written = serde_json::to_value(&entry).unwrap();
        assert_eq!(written["owner"], "ops");
        assert_eq!(written["status"], "offline");
        assert_eq!(written["auto_start"], false);
    }

    #[test]
    fn test_ssh_only_requires_no_command() {
        let mut entry = ServerEntry::new(
            "server-10-0-0-38",
            ServerConfig {
                mode: LaunchMode::Ssh,
                host: Some("10.0.0.38".to_string()),
                ..ServerConfig::default()
            },
        );
        assert!(entry.is_ssh_only());
        entry.command = Some("python3 server_10_0_0_38.py".to_string());
        assert!(!entry.is_ssh_only());
    }

    #[test]
    fn test_mark_offline_clears_pid() {
        let mut entry = ServerEntry::new("a", ServerConfig::default());
        entry.mark_online(100);
        assert!(entry.is_online());
        entry.mark_offline();
        assert_eq!(entry.pid, None);
        assert_eq!(entry.status, ServerStatus::Offline);
    }
}
