/// Server management module for Server Manager.
///
/// This module handles the lifecycle, liveness probing, process control and
/// resource inspection of managed servers.
/// All public operations of the lifecycle manager are instrumented with
/// `tracing` spans.
///
/// # Components
///
/// * `lifecycle` - The lifecycle manager: registry operations and reconciliation
/// * `events` - Bounded history of lifecycle events
/// * `monitor` - On-demand CPU, memory and disk figures
/// * `probe` - Process liveness checks
/// * `process` - Detached spawning and graceful termination
///
/// # Examples
///
/// Starting and stopping a server:
///
/// ```no_run
/// use server_manager::config::Config;
/// use server_manager::registry::ServerConfig;
/// use server_manager::server::LifecycleManager;
///
/// # async fn run() -> server_manager::Result<()> {
/// let mut manager = LifecycleManager::from_config(&Config::default())?;
///
/// manager.add("web", ServerConfig {
///     name: "Web".to_string(),
///     port: Some(8080),
///     command: Some("python3 -m http.server 8080".to_string()),
///     ..ServerConfig::default()
/// })?;
///
/// let entry = manager.start("web").await?;
/// println!("web running as pid {:?}", entry.pid);
///
/// manager.stop("web").await?;
/// # Ok(())
/// # }
/// ```
///
/// Checking liveness directly:
///
/// ```
/// use server_manager::server::{ProcessProbe, SystemProbe};
///
/// let probe = SystemProbe::new();
/// assert!(!probe.is_alive(0));
/// ```
pub mod events;
pub mod lifecycle;
pub mod monitor;
pub mod probe;
pub mod process;

pub use events::{EventLog, ServerEvent, ServerLifecycleEvent};
pub use lifecycle::{BatchOutcome, BatchReport, LifecycleManager, LifecycleSettings};
pub use monitor::{AdminReport, DiskStats, HostStats, ProcessStats, ProcessUsage, ResourceMonitor};
pub use probe::{ProcessProbe, SystemProbe};
