/*!
 # Server Manager

 A Rust library and terminal tool for tracking, starting, stopping and
 inspecting local server processes and SSH hosts.

 ## Overview

 Server Manager provides functionality to:
 - Keep a registry of servers persisted to a JSON document
 - Start registered commands as detached processes and stop them again
 - Reconcile recorded status against the processes actually running
 - Start or stop every registered server in one batch
 - Hand the terminal over to an interactive SSH session

 ## Basic Usage

 ```no_run
 use server_manager::{Config, LifecycleManager, Result};
 use server_manager::registry::ServerConfig;

 #[tokio::main(flavor = "current_thread")]
 async fn main() -> Result<()> {
     // Open the registry named by the configuration (seeded on first run)
     let mut manager = LifecycleManager::from_config(&Config::default())?;

     // Register a server
     manager.add("web", ServerConfig {
         name: "Web".to_string(),
         port: Some(8080),
         command: Some("python3 -m http.server 8080".to_string()),
         ..ServerConfig::default()
     })?;

     // Start it and look at its reconciled status
     manager.start("web").await?;
     let entry = manager.status("web")?;
     println!("{} is {} (pid {:?})", entry.id, entry.status, entry.pid);

     // Stop everything that is running
     let report = manager.stop_all().await;
     println!("stopped: {:?}", report.succeeded());

     Ok(())
 }
 ```

 ## Features

 - **Lifecycle**: start, stop, restart and batch operations with per-entry results
 - **Lazy reconciliation**: status is checked against the OS whenever it is read
 - **Persistence**: write-through JSON registry with backups
 - **SSH**: foreground interactive sessions on registered or ad-hoc hosts
 - **Administration**: CPU, memory, port and disk figures on demand
*/

pub mod config;
pub mod error;
pub mod normalize;
pub mod registry;
pub mod server;
pub mod shell;
pub mod ssh;

pub use config::Config;
pub use error::{Error, Result};
pub use registry::{LaunchMode, ServerConfig, ServerEntry, ServerStatus};
pub use server::{BatchReport, LifecycleManager};
pub use ssh::{SshLauncher, SshTarget};
