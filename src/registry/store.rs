use crate::error::{Error, Result};
use crate::registry::{ServerEntry, ServerStatus};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Record keys that are left out while they hold their default value,
/// unless the record already had them when it was loaded.
const OPTIONAL_KEYS: [&str; 4] = ["mode", "host", "working_directory", "auto_start"];

/// Persistence contract for the registry.
///
/// The lifecycle manager saves after every mutation; implementations are
/// not expected to batch or debounce.
#[cfg_attr(test, mockall::automock)]
pub trait RegistryStore: Send + Sync {
    /// Whether a persisted document exists yet.
    fn exists(&self) -> bool;

    /// Load all entries in document order. An absent document is empty.
    fn load(&self) -> Result<Vec<ServerEntry>>;

    /// Overwrite the document with these entries.
    fn save(&self, entries: &[ServerEntry]) -> Result<()>;
}

/// How a record looked on disk: its keys in order and, for files written
/// by older versions, the `running`/`stopped` status spelling.
#[derive(Debug, Clone, Default)]
struct RecordLayout {
    keys: Vec<String>,
    legacy_status: Option<String>,
}

impl RecordLayout {
    fn of(record: &Value) -> Self {
        let keys = record
            .as_object()
            .map(|fields| fields.keys().cloned().collect())
            .unwrap_or_default();
        let legacy_status = record
            .get("status")
            .and_then(Value::as_str)
            .filter(|s| matches!(*s, "running" | "stopped"))
            .map(str::to_string);
        Self {
            keys,
            legacy_status,
        }
    }

    fn has(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// The legacy spelling, while it still describes `status`.
    fn status_spelling(&self, status: ServerStatus) -> Option<&str> {
        match (self.legacy_status.as_deref(), status) {
            (Some("running"), ServerStatus::Online) => Some("running"),
            (Some("stopped"), ServerStatus::Offline) => Some("stopped"),
            _ => None,
        }
    }
}

/// Registry kept in a pretty-printed JSON file mapping id to record.
///
/// Records are written back in the shape they were read: same keys, same
/// order, same status spelling, so saving an unmodified registry leaves the
/// document structurally unchanged.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    layouts: Mutex<HashMap<String, RecordLayout>>,
}

impl JsonFileStore {
    /// Create a store for the file at `path`. Nothing is read until `load`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            layouts: Mutex::new(HashMap::new()),
        }
    }

    /// Path of the registry document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse a registry document.
    pub fn parse_from_str(content: &str) -> Result<Vec<ServerEntry>> {
        Ok(Self::parse_document(content)?
            .into_iter()
            .map(|(entry, _)| entry)
            .collect())
    }

    /// Render entries as a registry document, in the current record shape.
    pub fn render(entries: &[ServerEntry]) -> Result<String> {
        Self::render_with(entries, &HashMap::new())
    }

    fn parse_document(content: &str) -> Result<Vec<(ServerEntry, RecordLayout)>> {
        let document: Map<String, Value> = serde_json::from_str(content)
            .map_err(|e| Error::PersistenceFailure(format!("Failed to parse registry: {}", e)))?;

        document
            .into_iter()
            .map(|(id, record)| {
                let layout = RecordLayout::of(&record);
                let mut entry: ServerEntry = serde_json::from_value(record).map_err(|e| {
                    Error::PersistenceFailure(format!("Invalid record for '{}': {}", id, e))
                })?;
                entry.id = id;
                Ok((entry, layout))
            })
            .collect()
    }

    fn render_with(entries: &[ServerEntry], layouts: &HashMap<String, RecordLayout>) -> Result<String> {
        let mut document = Map::new();
        for entry in entries {
            let record = Self::render_record(entry, layouts.get(&entry.id))?;
            document.insert(entry.id.clone(), Value::Object(record));
        }

        let mut content = serde_json::to_string_pretty(&Value::Object(document))
            .map_err(|e| Error::PersistenceFailure(format!("Failed to serialize registry: {}", e)))?;
        content.push('\n');
        Ok(content)
    }

    fn render_record(entry: &ServerEntry, layout: Option<&RecordLayout>) -> Result<Map<String, Value>> {
        let serialized = serde_json::to_value(entry).map_err(|e| {
            Error::PersistenceFailure(format!("Failed to serialize '{}': {}", entry.id, e))
        })?;
        let Value::Object(mut record) = serialized else {
            return Err(Error::PersistenceFailure(format!(
                "Record for '{}' is not an object",
                entry.id
            )));
        };

        record.retain(|key, value| {
            !is_default_optional(key, value) || layout.is_some_and(|l| l.has(key))
        });

        let Some(layout) = layout else {
            return Ok(record);
        };

        if let Some(spelling) = layout.status_spelling(entry.status) {
            record.insert("status".to_string(), Value::String(spelling.to_string()));
        }

        // Keys in their loaded order, anything new after them.
        let mut ordered = Map::new();
        for key in &layout.keys {
            if let Some(value) = record.shift_remove(key) {
                ordered.insert(key.clone(), value);
            }
        }
        ordered.extend(record);
        Ok(ordered)
    }

    fn layouts(&self) -> MutexGuard<'_, HashMap<String, RecordLayout>> {
        self.layouts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "servers.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Write `content` to the temp file and flush it to disk.
    fn write_synced(path: &Path, content: &str) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()
    }
}

fn is_default_optional(key: &str, value: &Value) -> bool {
    OPTIONAL_KEYS.contains(&key)
        && match value {
            Value::Null => true,
            Value::Bool(flag) => !flag,
            Value::String(mode) => key == "mode" && mode == "process",
            _ => false,
        }
}

impl RegistryStore for JsonFileStore {
    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn load(&self) -> Result<Vec<ServerEntry>> {
        if !self.path.exists() {
            tracing::debug!(path = ?self.path, "Registry file absent, starting empty");
            self.layouts().clear();
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| Error::PersistenceFailure(format!("Failed to read registry: {}", e)))?;
        let parsed = Self::parse_document(&content)?;

        let mut layouts = self.layouts();
        layouts.clear();
        let entries: Vec<ServerEntry> = parsed
            .into_iter()
            .map(|(entry, layout)| {
                layouts.insert(entry.id.clone(), layout);
                entry
            })
            .collect();
        tracing::debug!(path = ?self.path, count = entries.len(), "Loaded registry");
        Ok(entries)
    }

    fn save(&self, entries: &[ServerEntry]) -> Result<()> {
        let mut layouts = self.layouts();
        layouts.retain(|id, _| entries.iter().any(|e| &e.id == id));
        let content = Self::render_with(entries, &layouts)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                Error::PersistenceFailure(format!("Failed to create registry directory: {}", e))
            })?;
        }

        // Write beside the target and rename so readers never see a torn file.
        let temp = self.temp_path();
        Self::write_synced(&temp, &content).map_err(|e| {
            let _ = fs::remove_file(&temp);
            Error::PersistenceFailure(format!("Failed to write registry: {}", e))
        })?;
        fs::rename(&temp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp);
            Error::PersistenceFailure(format!("Failed to replace registry: {}", e))
        })?;

        tracing::trace!(path = ?self.path, count = entries.len(), "Saved registry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{LaunchMode, ServerConfig};

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("servers.json"));
        assert!(!store.exists());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_keeps_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("servers.json"));

        let entries: Vec<ServerEntry> = ["zeta", "alpha", "mid"]
            .iter()
            .map(|id| ServerEntry::new(*id, ServerConfig::default()))
            .collect();
        store.save(&entries).unwrap();

        let loaded = store.load().unwrap();
        let ids: Vec<&str> = loaded.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
        assert!(loaded.iter().all(|e| e.status == ServerStatus::Offline));
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_corrupt_file_is_persistence_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.json");
        fs::write(&path, "{ not json").unwrap();

        let err = JsonFileStore::new(path).load().unwrap_err();
        assert!(matches!(err, Error::PersistenceFailure(_)));
    }

    #[test]
    fn test_new_records_omit_default_optionals() {
        let rendered = JsonFileStore::render(&[ServerEntry::new("web", ServerConfig::default())]).unwrap();
        let document: Value = serde_json::from_str(&rendered).unwrap();
        let keys: Vec<&String> = document["web"].as_object().unwrap().keys().collect();
        assert_eq!(
            keys,
            vec!["name", "port", "command", "description", "status", "pid"]
        );
    }

    #[test]
    fn test_loaded_optionals_are_written_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.json");
        fs::write(
            &path,
            r#"{"web": {"name": "web", "mode": "process", "auto_start": false, "status": "stopped"}}"#,
        )
        .unwrap();

        let store = JsonFileStore::new(&path);
        let mut entries = store.load().unwrap();
        assert_eq!(entries[0].mode, LaunchMode::Process);
        store.save(&entries).unwrap();

        let saved: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["web"]["mode"], "process");
        assert_eq!(saved["web"]["auto_start"], false);
        assert_eq!(saved["web"]["status"], "stopped");

        // A changed status drops the legacy spelling.
        entries[0].mark_online(42);
        store.save(&entries).unwrap();
        let saved: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["web"]["status"], "online");
    }

    #[test]
    fn test_save_replaces_stale_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("servers.json"));
        fs::write(store.temp_path(), "leftover from a crash").unwrap();

        store
            .save(&[ServerEntry::new("web", ServerConfig::default())])
            .unwrap();

        assert!(!store.temp_path().exists());
        assert_eq!(store.load().unwrap()[0].id, "web");
    }
}
