use crate::config::{Config, SeedEntry};
use crate::error::{Error, Result};
use crate::normalize::{lookup_candidates, normalize_id};
use crate::registry::{JsonFileStore, RegistryStore, ServerConfig, ServerEntry};
use crate::server::events::{EventLog, ServerEvent, ServerLifecycleEvent};
use crate::server::monitor::{AdminReport, ResourceMonitor};
use crate::server::probe::{ProcessProbe, SystemProbe};
use crate::server::process;
use crate::ssh::{SessionLauncher, SshTarget};
use std::path::PathBuf;
use std::time::Duration;

/// Tunables of the lifecycle manager.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// How long `stop` waits after SIGTERM before SIGKILL
    pub stop_grace_period: Duration,
    /// Pause between the stop and start phases of `restart`
    pub restart_delay: Duration,
    /// Refuse to start an entry whose port already accepts connections
    pub check_port_before_start: bool,
    /// Directory receiving process output
    pub log_dir: Option<PathBuf>,
    /// User for SSH hosts given without one
    pub ssh_default_user: String,
    /// Port for SSH hosts given without one
    pub ssh_default_port: u16,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl LifecycleSettings {
    /// Settings taken from the tool configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            stop_grace_period: config.stop_grace_period(),
            restart_delay: config.restart_delay(),
            check_port_before_start: config.check_port_before_start,
            log_dir: config.log_dir.clone(),
            ssh_default_user: config.ssh.default_user.clone(),
            ssh_default_port: config.ssh.default_port,
        }
    }
}

/// Outcome of one entry in a batch operation.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Entry id
    pub id: String,
    /// The entry after the operation, or why it failed
    pub result: Result<ServerEntry>,
}

/// Per-entry results of `start_all`, `stop_all` and `start_auto`.
///
/// Outcomes are independent; a failure never rolls back another entry.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Outcomes in registry order
    pub outcomes: Vec<BatchOutcome>,
}

impl BatchReport {
    /// Ids that succeeded
    pub fn succeeded(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.id.as_str())
            .collect()
    }

    /// Ids that failed, with their errors
    pub fn failed(&self) -> Vec<(&str, &Error)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.id.as_str(), e)))
            .collect()
    }

    /// Result for one id
    pub fn get(&self, id: &str) -> Option<&Result<ServerEntry>> {
        self.outcomes.iter().find(|o| o.id == id).map(|o| &o.result)
    }
}

/// The server lifecycle manager.
///
/// Owns the in-memory registry, decides which transitions are legal and
/// writes every successful mutation through to the store. Declared status
/// is never trusted on its own: every status-reporting operation first
/// reconciles `online` entries against the process probe. There is no
/// background polling.
///
/// All public methods are instrumented with `tracing` spans.
pub struct LifecycleManager {
    entries: Vec<ServerEntry>,
    store: Box<dyn RegistryStore>,
    probe: Box<dyn ProcessProbe>,
    settings: LifecycleSettings,
    events: EventLog,
    monitor: ResourceMonitor,
}

impl LifecycleManager {
    /// Open the registry described by the configuration.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(config), fields(registry = ?config.registry_path))]
    pub fn from_config(config: &Config) -> Result<Self> {
        tracing::info!("Opening registry");
        Self::open(
            Box::new(JsonFileStore::new(config.registry_path.clone())),
            Box::new(SystemProbe::new()),
            LifecycleSettings::from_config(config),
            &config.seed,
        )
    }

    /// Load the registry from `store`.
    ///
    /// When the store has no document yet, the seed entries are added and
    /// saved.
    pub fn open(
        store: Box<dyn RegistryStore>,
        probe: Box<dyn ProcessProbe>,
        settings: LifecycleSettings,
        seed: &[SeedEntry],
    ) -> Result<Self> {
        let first_run = !store.exists();
        let entries = store.load()?;

        let mut manager = Self {
            entries,
            store,
            probe,
            settings,
            events: EventLog::new(),
            monitor: ResourceMonitor::new(),
        };

        if first_run && manager.entries.is_empty() && !seed.is_empty() {
            tracing::info!(count = seed.len(), "Seeding default entries");
            for seed in seed {
                manager
                    .entries
                    .push(ServerEntry::new(seed.id.clone(), seed.server.clone()));
            }
            manager.persist()?;
        }

        Ok(manager)
    }

    /// Current settings
    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    /// Number of registered entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an entry with this exact id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// Registered ids in insertion order.
    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    /// Map free-text input to a registry id.
    ///
    /// Returns the first spelling of `input` that is registered, or its
    /// normalized form when none is, so lookups still report `NotFound`
    /// under the normalized id.
    pub fn resolve_id(&self, input: &str) -> String {
        lookup_candidates(input)
            .into_iter()
            .find(|id| self.contains(id))
            .unwrap_or_else(|| normalize_id(input))
    }

    /// All entries, reconciled, in insertion order.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub fn list(&mut self) -> Vec<ServerEntry> {
        let mut changed = false;
        for idx in 0..self.entries.len() {
            changed |= self.reconcile(idx);
        }
        if changed {
            if let Err(e) = self.persist() {
                tracing::warn!(error = %e, "Failed to save reconciled registry");
            }
        }
        self.entries.clone()
    }

    /// Reconciled snapshot of one entry.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_id = %id))]
    pub fn status(&mut self, id: &str) -> Result<ServerEntry> {
        let idx = self.reconciled(id)?;
        Ok(self.entries[idx].clone())
    }

    /// Register a new offline entry.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self, config), fields(server_id = %id))]
    pub fn add(&mut self, id: &str, config: ServerConfig) -> Result<ServerEntry> {
        if self.contains(id) {
            tracing::warn!("Refusing duplicate entry");
            return Err(Error::DuplicateEntry(id.to_string()));
        }

        let entry = ServerEntry::new(id, config);
        self.entries.push(entry.clone());
        self.events.record(id, ServerLifecycleEvent::Added, None);
        tracing::info!("Server added");
        self.persist()?;
        Ok(entry)
    }

    /// Remove an entry, stopping it first when it is online.
    ///
    /// A failing stop is logged and does not block removal.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_id = %id))]
    pub async fn remove(&mut self, id: &str) -> Result<ServerEntry> {
        let idx = self.reconciled(id)?;

        if self.entries[idx].is_online() {
            tracing::debug!("Stopping online server before removal");
            match self.stop(id).await {
                Ok(_) | Err(Error::NotRunning(_)) => {}
                Err(e) => tracing::warn!(error = %e, "Stop failed during removal, removing anyway"),
            }
        }

        let idx = self.position(id).ok_or_else(|| Error::NotFound(id.to_string()))?;
        let entry = self.entries.remove(idx);
        self.events.record(id, ServerLifecycleEvent::Removed, None);
        tracing::info!("Server removed");
        self.persist()?;
        Ok(entry)
    }

    /// Start the entry's command as a detached process.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_id = %id))]
    pub async fn start(&mut self, id: &str) -> Result<ServerEntry> {
        tracing::info!("Attempting to start server");
        let idx = self.reconciled(id)?;
        let entry = &self.entries[idx];

        if entry.is_online() {
            tracing::debug!(pid = ?entry.pid, "Server already running");
            return Err(Error::AlreadyRunning(id.to_string()));
        }
        if entry.is_ssh_only() {
            return Err(Error::SessionOnly(id.to_string()));
        }
        if !entry.has_command() {
            return Err(Error::MissingCommand(id.to_string()));
        }

        if let Some(port) = entry.port.filter(|_| self.settings.check_port_before_start) {
            if process::port_in_use(port).await {
                tracing::warn!(port, "Port already in use");
                self.events.record(
                    id,
                    ServerLifecycleEvent::Failed,
                    Some(format!("port {} in use", port)),
                );
                return Err(Error::PortInUse {
                    id: id.to_string(),
                    port,
                });
            }
        }

        let pid = match process::spawn_detached(entry, self.settings.log_dir.as_deref()) {
            Ok(pid) => pid,
            Err(e) => {
                tracing::error!(error = %e, "Failed to start server process");
                self.events
                    .record(id, ServerLifecycleEvent::Failed, Some(e.to_string()));
                return Err(e);
            }
        };

        self.entries[idx].mark_online(pid);
        self.events
            .record(id, ServerLifecycleEvent::Started, Some(format!("pid {}", pid)));
        tracing::info!(pid, "Server started successfully");
        self.persist()?;
        Ok(self.entries[idx].clone())
    }

    /// Stop the entry's process.
    ///
    /// Acts on the declared status rather than a reconciled one: an entry
    /// recorded online whose pid no longer exists is stopped without error.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_id = %id))]
    pub async fn stop(&mut self, id: &str) -> Result<ServerEntry> {
        tracing::info!("Attempting to stop server");
        let idx = self.position(id).ok_or_else(|| {
            tracing::warn!("Unknown server");
            Error::NotFound(id.to_string())
        })?;

        let Some(pid) = self.entries[idx].pid.filter(|_| self.entries[idx].is_online()) else {
            tracing::debug!("Server is not running");
            // Online without a pid, or offline with a stray one.
            if self.reconcile(idx) {
                if let Err(e) = self.persist() {
                    tracing::warn!(error = %e, "Failed to save reconciled entry");
                }
            }
            return Err(Error::NotRunning(id.to_string()));
        };

        if let Err(e) =
            process::terminate(pid, self.settings.stop_grace_period, self.probe.as_ref()).await
        {
            tracing::error!(pid, error = %e, "Failed to stop server process");
            self.events
                .record(id, ServerLifecycleEvent::Failed, Some(e.to_string()));
            return Err(e);
        }

        self.entries[idx].mark_offline();
        self.events
            .record(id, ServerLifecycleEvent::Stopped, Some(format!("pid {}", pid)));
        tracing::info!(pid, "Server stopped successfully");
        self.persist()?;
        Ok(self.entries[idx].clone())
    }

    /// Stop (tolerating `NotRunning`) and start again.
    ///
    /// The phases are not atomic; when the start phase fails the entry is
    /// left offline.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_id = %id))]
    pub async fn restart(&mut self, id: &str) -> Result<ServerEntry> {
        tracing::info!("Restarting server");
        match self.stop(id).await {
            Ok(_) => {
                if !self.settings.restart_delay.is_zero() {
                    tokio::time::sleep(self.settings.restart_delay).await;
                }
            }
            Err(Error::NotRunning(_)) => tracing::debug!("Server was not running"),
            Err(e) => return Err(e),
        }

        let entry = self.start(id).await?;
        self.events.record(id, ServerLifecycleEvent::Restarted, None);
        Ok(entry)
    }

    /// Start every entry, continuing past failures.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub async fn start_all(&mut self) -> BatchReport {
        tracing::info!("Starting all servers");
        let mut report = BatchReport::default();
        for id in self.ids() {
            let result = self.start(&id).await;
            if let Err(e) = &result {
                tracing::warn!(server_id = %id, error = %e, "Failed to start server");
            }
            report.outcomes.push(BatchOutcome { id, result });
        }
        tracing::info!(
            started = report.succeeded().len(),
            failed = report.failed().len(),
            "Finished starting all servers"
        );
        report
    }

    /// Stop every entry, continuing past failures.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub async fn stop_all(&mut self) -> BatchReport {
        tracing::info!("Stopping all servers");
        let mut report = BatchReport::default();
        for id in self.ids() {
            let result = self.stop(&id).await;
            if let Err(e) = &result {
                tracing::debug!(server_id = %id, error = %e, "Server not stopped");
            }
            report.outcomes.push(BatchOutcome { id, result });
        }
        report
    }

    /// Start the entries flagged `auto_start` that are not running.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub async fn start_auto(&mut self) -> BatchReport {
        let auto: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.auto_start)
            .map(|e| e.id.clone())
            .collect();

        let mut report = BatchReport::default();
        for id in auto {
            if self.status(&id).is_ok_and(|e| e.is_online()) {
                continue;
            }
            tracing::info!(server_id = %id, "Auto-starting server");
            let result = self.start(&id).await;
            report.outcomes.push(BatchOutcome { id, result });
        }
        report
    }

    /// Live resource report for an entry.
    ///
    /// Queries the host regardless of declared status; a process that is
    /// not running is reported as unavailable rather than as an error.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_id = %id))]
    pub async fn administer(&mut self, id: &str) -> Result<AdminReport> {
        let entry = self.status(id)?;
        let process = self.monitor.process_usage(entry.pid);
        let port_in_use = match entry.port {
            Some(port) => Some(process::port_in_use(port).await),
            None => None,
        };
        let host = self.monitor.host_stats();

        Ok(AdminReport {
            entry,
            process,
            port_in_use,
            host,
        })
    }

    /// SSH target of an entry.
    pub fn ssh_target(&self, id: &str) -> Result<SshTarget> {
        let idx = self.position(id).ok_or_else(|| Error::NotFound(id.to_string()))?;
        let host = self.entries[idx]
            .host
            .as_deref()
            .ok_or_else(|| Error::NotSshTarget(id.to_string()))?;
        SshTarget::parse(
            host,
            &self.settings.ssh_default_user,
            self.settings.ssh_default_port,
        )
    }

    /// Open an interactive session on an entry's SSH host.
    ///
    /// Foreground takeover: blocks until the session ends. Sessions are
    /// not managed processes, so no pid or status is recorded.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self, launcher), fields(server_id = %id))]
    pub async fn open_session(
        &mut self,
        id: &str,
        launcher: &dyn SessionLauncher,
    ) -> Result<i32> {
        let target = self.ssh_target(id)?;
        match launcher.open_interactive_session(&target).await {
            Ok(code) => {
                self.events.record(
                    id,
                    ServerLifecycleEvent::SessionEnded,
                    Some(format!("exit code {}", code)),
                );
                Ok(code)
            }
            Err(e) => {
                self.events
                    .record(id, ServerLifecycleEvent::Failed, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Recent lifecycle events, newest first.
    pub fn events(&self, id: Option<&str>, limit: Option<usize>) -> Vec<ServerEvent> {
        self.events.recent(id, limit)
    }

    /// Replace the in-memory registry with the stored one.
    ///
    /// Used after restoring a backup.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub fn reload(&mut self) -> Result<()> {
        self.entries = self.store.load()?;
        tracing::info!(count = self.entries.len(), "Reloaded registry");
        Ok(())
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    /// Look up and reconcile one entry, saving any correction.
    fn reconciled(&mut self, id: &str) -> Result<usize> {
        let idx = self.position(id).ok_or_else(|| {
            tracing::warn!(server_id = %id, "Unknown server");
            Error::NotFound(id.to_string())
        })?;
        if self.reconcile(idx) {
            self.persist()?;
        }
        Ok(idx)
    }

    /// Bring an entry's declared status in line with the process table.
    ///
    /// Returns whether the entry changed.
    fn reconcile(&mut self, idx: usize) -> bool {
        let entry = &mut self.entries[idx];

        if !entry.is_online() {
            if entry.pid.is_some() {
                tracing::debug!(server_id = %entry.id, "Clearing pid of offline server");
                entry.pid = None;
                return true;
            }
            return false;
        }

        let alive = entry.pid.is_some_and(|pid| self.probe.is_alive(pid));
        if alive {
            return false;
        }

        tracing::info!(server_id = %entry.id, pid = ?entry.pid, "Server process is gone, marking offline");
        let details = entry.pid.map(|pid| format!("pid {} not running", pid));
        let id = entry.id.clone();
        entry.mark_offline();
        self.events.record(&id, ServerLifecycleEvent::Vanished, details);
        true
    }

    fn persist(&self) -> Result<()> {
        self.store.save(&self.entries).map_err(|e| {
            tracing::error!(error = %e, "Failed to save registry, continuing with in-memory state");
            match e {
                Error::PersistenceFailure(_) => e,
                other => Error::PersistenceFailure(other.to_string()),
            }
        })
    }
}
