//! Interactive menu shell.
//!
//! Renders the menu, collects free-text input, normalizes ids and
//! dispatches to the lifecycle manager or straight to the SSH launcher.
//! Failures are printed and the loop continues; nothing here aborts the
//! session except end of input or the quit choice.

pub mod prompt;
pub mod render;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::normalize::{address_from_id, normalize_id};
use crate::registry::{LaunchMode, ServerConfig, backup};
use crate::server::LifecycleManager;
use crate::ssh::{SessionLauncher, SshLauncher, SshTarget};
use prompt::Prompt;
use std::path::PathBuf;
use tokio::io::AsyncBufRead;

/// What the menu loop does after a choice.
enum Flow {
    Continue,
    Quit,
}

/// The interactive menu.
pub struct Shell<R> {
    manager: LifecycleManager,
    config: Config,
    launcher: std::result::Result<SshLauncher, Error>,
    prompt: Prompt<R>,
}

impl<R: AsyncBufRead + Unpin> Shell<R> {
    /// Create a shell over a manager.
    ///
    /// `launcher` is the outcome of the startup SSH capability check; when
    /// it failed, SSH choices explain why instead of running.
    pub fn new(
        manager: LifecycleManager,
        config: Config,
        launcher: std::result::Result<SshLauncher, Error>,
        prompt: Prompt<R>,
    ) -> Self {
        Self {
            manager,
            config,
            launcher,
            prompt,
        }
    }

    /// Run the menu until the user quits or input ends.
    pub async fn run(&mut self) -> std::io::Result<()> {
        if let Err(e) = &self.launcher {
            println!("Note: SSH features disabled ({})", e);
        }

        let auto = self.manager.start_auto().await;
        if !auto.outcomes.is_empty() {
            println!("Auto-start:\n{}", render::batch_report(&auto));
        }

        loop {
            print_menu();
            let Some(choice) = self.prompt.ask("\nChoose an option (0-9, A, E, B, S): ").await? else {
                break;
            };

            match self.dispatch(&choice.to_uppercase()).await? {
                Flow::Continue => {}
                Flow::Quit => break,
            }

            if self.prompt.ask("\nPress Enter to continue...").await?.is_none() {
                break;
            }
        }

        println!("Exiting...");
        Ok(())
    }

    async fn dispatch(&mut self, choice: &str) -> std::io::Result<Flow> {
        match choice {
            "0" | "Q" => return Ok(Flow::Quit),
            "1" => println!("{}", render::entry_table(&self.manager.list())),
            "2" => self.add_interactive().await?,
            "3" => self.remove_interactive().await?,
            "4" => self.start_interactive().await?,
            "5" => {
                if let Some(id) = self.ask_id("Server to stop").await? {
                    let result = self.manager.stop(&id).await;
                    report(result.map(|e| format!("Server '{}' stopped.", e.id)));
                }
            }
            "6" => {
                if let Some(id) = self.ask_id("Server to restart").await? {
                    let result = self.manager.restart(&id).await;
                    report(result.map(|e| {
                        format!("Server '{}' restarted (pid {})", e.id, pid_text(e.pid))
                    }));
                }
            }
            "7" => {
                if let Some(id) = self.ask_id("Server to inspect").await? {
                    report(self.manager.status(&id).map(|e| render::entry_details(&e)));
                }
            }
            "8" => {
                println!("Starting all servers...");
                println!("{}", render::batch_report(&self.manager.start_all().await));
            }
            "9" => {
                println!("Stopping all servers...");
                println!("{}", render::batch_report(&self.manager.stop_all().await));
            }
            "A" => {
                if let Some(id) = self.ask_id("Server to administer").await? {
                    let result = self.manager.administer(&id).await;
                    report(result.map(|r| render::admin_report(&r)));
                }
            }
            "E" => println!("{}", render::events(&self.manager.events(None, Some(50)))),
            "B" => self.backup_interactive().await?,
            "S" => self.ssh_interactive().await?,
            _ => println!("Invalid choice, try again."),
        }
        Ok(Flow::Continue)
    }

    /// Show the table, read an id and resolve it against the registry.
    async fn ask_id(&mut self, label: &str) -> std::io::Result<Option<String>> {
        if self.manager.is_empty() {
            println!("No servers configured.");
            return Ok(None);
        }
        println!("{}", render::entry_table(&self.manager.list()));

        let Some(input) = self.prompt.ask(&format!("\n{} (id or address): ", label)).await? else {
            return Ok(None);
        };
        if input.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.manager.resolve_id(&input)))
    }

    async fn add_interactive(&mut self) -> std::io::Result<()> {
        println!("\n--- Add server ---");
        let Some(input) = self.prompt.ask("Address or name: ").await? else {
            return Ok(());
        };
        if input.is_empty() {
            println!("A name is required.");
            return Ok(());
        }
        let id = normalize_id(&input);

        let name = self.prompt.ask_or(&format!("Display name [{}]: ", id), &id).await?;
        let command = self.prompt.ask("Command to run (blank for none): ").await?;
        let port = match self.prompt.ask("Port (blank for none): ").await?.as_deref() {
            None | Some("") => None,
            Some(port) => match port.parse::<u16>() {
                Ok(port) if port != 0 => Some(port),
                _ => {
                    println!("Invalid port.");
                    return Ok(());
                }
            },
        };
        let working_directory = self
            .prompt
            .ask("Working directory (blank for current): ")
            .await?
            .filter(|d| !d.is_empty())
            .map(PathBuf::from);
        let description = self.prompt.ask("Description (optional): ").await?;

        let (mode, host) = if self.prompt.confirm("Reachable over SSH? (y/N): ").await? {
            let default_host = address_from_id(&id).unwrap_or_else(|| input.clone());
            let host = self
                .prompt
                .ask_or(&format!("SSH host [{}]: ", default_host), &default_host)
                .await?;
            (LaunchMode::Ssh, host)
        } else {
            (LaunchMode::Process, None)
        };
        let auto_start = self.prompt.confirm("Start automatically? (y/N): ").await?;

        let config = ServerConfig {
            name: name.unwrap_or_else(|| id.clone()),
            port,
            command: command.filter(|c| !c.is_empty()),
            description: description.unwrap_or_default(),
            mode,
            host,
            working_directory,
            auto_start,
        };
        report(
            self.manager
                .add(&id, config)
                .map(|e| format!("Server '{}' added.", e.id)),
        );
        Ok(())
    }

    async fn remove_interactive(&mut self) -> std::io::Result<()> {
        let Some(id) = self.ask_id("Server to remove").await? else {
            return Ok(());
        };
        if self
            .prompt
            .confirm(&format!("Really remove '{}'? (y/N): ", id))
            .await?
        {
            let result = self.manager.remove(&id).await;
            report(result.map(|e| format!("Server '{}' removed.", e.id)));
        }
        Ok(())
    }

    /// Start a process, or for SSH entries let the user pick a session.
    async fn start_interactive(&mut self) -> std::io::Result<()> {
        let Some(id) = self.ask_id("Server to start").await? else {
            return Ok(());
        };

        let entry = match self.manager.status(&id) {
            Ok(entry) => entry,
            Err(e) => {
                report::<String>(Err(e));
                return Ok(());
            }
        };

        if entry.mode == LaunchMode::Ssh {
            let open_session = if entry.is_ssh_only() {
                self.prompt
                    .confirm(&format!("'{}' is an SSH host. Open a session? (y/N): ", id))
                    .await?
            } else {
                println!("1. Start the local command");
                println!("2. Open an SSH session");
                self.prompt.ask("Choose: ").await?.as_deref() == Some("2")
            };
            if open_session {
                self.session_for_entry(&id).await;
                return Ok(());
            }
            if entry.is_ssh_only() {
                return Ok(());
            }
        }

        let result = self.manager.start(&id).await;
        report(result.map(|e| {
            let port = e.port.map(|p| format!(" on port {}", p)).unwrap_or_default();
            format!("Server '{}' started{} (pid {})", e.id, port, pid_text(e.pid))
        }));
        Ok(())
    }

    async fn session_for_entry(&mut self, id: &str) {
        let launcher = match &self.launcher {
            Ok(launcher) => launcher,
            Err(e) => {
                println!("SSH unavailable: {}", e);
                return;
            }
        };
        let result = self.manager.open_session(id, launcher).await;
        report(result.map(|code| format!("Session ended (exit code {}).", code)));
    }

    async fn backup_interactive(&mut self) -> std::io::Result<()> {
        println!("\n--- Backup / restore registry ---");
        println!("1. Create backup");
        println!("2. Restore from backup");
        println!("0. Back");

        let registry = self.config.registry_path.clone();
        match self.prompt.ask("Choose: ").await?.as_deref() {
            Some("1") => report(
                backup::create_backup(&registry)
                    .map(|path| format!("Backup created: {}", path.display())),
            ),
            Some("2") => {
                let dir = registry
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("."));
                let backups = match backup::list_backups(&dir) {
                    Ok(backups) if backups.is_empty() => {
                        println!("No backups found.");
                        return Ok(());
                    }
                    Ok(backups) => backups,
                    Err(e) => {
                        report::<String>(Err(e));
                        return Ok(());
                    }
                };

                for (i, path) in backups.iter().enumerate() {
                    println!("  {}. {}", i + 1, path.display());
                }
                let choice = self.prompt.ask("Backup to restore: ").await?;
                let Some(path) = choice
                    .and_then(|c| c.parse::<usize>().ok())
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| backups.get(i))
                else {
                    println!("Invalid choice.");
                    return Ok(());
                };

                let result = backup::restore_backup(path, &registry).and_then(|_| self.manager.reload());
                report(result.map(|_| format!("Restored from {}", path.display())));
            }
            _ => {}
        }
        Ok(())
    }

    async fn ssh_interactive(&mut self) -> std::io::Result<()> {
        if let Err(e) = &self.launcher {
            println!("SSH unavailable: {}", e);
            return Ok(());
        }

        println!("\n--- SSH ---");
        println!("1. Connect to this machine");
        println!("2. Connect to a remote host");
        println!("3. Connect to a registered server");
        println!("0. Back");

        let ssh = self.config.ssh.clone();
        let target = match self.prompt.ask("Choose: ").await?.as_deref() {
            Some("1") => SshTarget::local(ssh.default_port),
            Some("2") => {
                let Some(host) = self.prompt.ask("Host or address: ").await? else {
                    return Ok(());
                };
                let user = self
                    .prompt
                    .ask_or(&format!("User [{}]: ", ssh.default_user), &ssh.default_user)
                    .await?
                    .unwrap_or_else(|| ssh.default_user.clone());
                let port = self
                    .prompt
                    .ask_or(&format!("Port [{}]: ", ssh.default_port), &ssh.default_port.to_string())
                    .await?
                    .and_then(|p| p.parse::<u16>().ok())
                    .unwrap_or(ssh.default_port);
                match SshTarget::parse(&host, &user, port) {
                    Ok(target) => target,
                    Err(e) => {
                        report::<String>(Err(e));
                        return Ok(());
                    }
                }
            }
            Some("3") => {
                if let Some(id) = self.ask_id("Server to connect to").await? {
                    self.session_for_entry(&id).await;
                }
                return Ok(());
            }
            _ => return Ok(()),
        };

        if let Ok(launcher) = &self.launcher {
            println!("Connecting to {}...", target);
            let result = launcher.open_interactive_session(&target).await;
            report(result.map(|code| format!("Session ended (exit code {}).", code)));
        }
        Ok(())
    }
}

fn print_menu() {
    println!("\n{}", "=".repeat(50));
    println!("SERVER MANAGER");
    println!("{}", "=".repeat(50));
    println!("1. List servers");
    println!("2. Add server");
    println!("3. Remove server");
    println!("4. Start server");
    println!("5. Stop server");
    println!("6. Restart server");
    println!("7. Server status");
    println!("8. Start all servers");
    println!("9. Stop all servers");
    println!("A. Administer server");
    println!("E. Recent events");
    println!("B. Backup / restore registry");
    println!("S. SSH connection");
    println!("0. Quit");
    println!("{}", "=".repeat(50));
}

fn pid_text(pid: Option<u32>) -> String {
    pid.map(|p| p.to_string()).unwrap_or_else(|| "N/A".to_string())
}

/// Print a success message or the error.
fn report<T: std::fmt::Display>(result: Result<T>) {
    match result {
        Ok(message) => println!("{}", message),
        Err(e @ Error::PersistenceFailure(_)) => {
            println!("Warning: {}. Changes are kept for this session only.", e)
        }
        Err(e) => println!("Error: {}", e),
    }
}
