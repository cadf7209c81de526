use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use server_manager::config::{DEFAULT_CONFIG_PATH, validate_config};
use server_manager::shell::{Shell, prompt::Prompt, render};
use server_manager::ssh::SessionLauncher;
use server_manager::{Config, LifecycleManager, SshLauncher, SshTarget};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(
    name = "server-manager",
    about = "Start, stop and inspect local servers and SSH hosts"
)]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Registry document, overriding the configuration
    #[arg(short, long, global = true)]
    registry: Option<PathBuf>,

    /// Log filter, overriding RUST_LOG
    #[arg(long, global = true)]
    log: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List all servers with reconciled status
    List,
    /// Show one server
    Status { id: String },
    /// Start a server
    Start { id: String },
    /// Stop a server
    Stop { id: String },
    /// Restart a server
    Restart { id: String },
    /// Start every server
    StartAll,
    /// Stop every server
    StopAll,
    /// Open an SSH session on a registered server or a `user@host:port` target
    Ssh { target: String },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log {
        Some(filter) => EnvFilter::new(filter),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::from_file_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(registry) = cli.registry {
        config.registry_path = registry;
    }
    validate_config(&config)?;

    let mut manager = LifecycleManager::from_config(&config)
        .with_context(|| format!("opening registry {}", config.registry_path.display()))?;
    let launcher = SshLauncher::detect(&config.ssh.client);

    let Some(command) = cli.command else {
        let mut shell = Shell::new(manager, config, launcher, Prompt::stdin());
        shell.run().await?;
        return Ok(());
    };

    match command {
        Commands::List => println!("{}", render::entry_table(&manager.list())),
        Commands::Status { id } => {
            let id = manager.resolve_id(&id);
            let entry = manager.status(&id)?;
            println!("{}", render::entry_details(&entry));
        }
        Commands::Start { id } => {
            let id = manager.resolve_id(&id);
            let entry = manager.start(&id).await?;
            println!("{} started (pid {:?})", entry.id, entry.pid);
        }
        Commands::Stop { id } => {
            let id = manager.resolve_id(&id);
            let entry = manager.stop(&id).await?;
            println!("{} stopped", entry.id);
        }
        Commands::Restart { id } => {
            let id = manager.resolve_id(&id);
            let entry = manager.restart(&id).await?;
            println!("{} restarted (pid {:?})", entry.id, entry.pid);
        }
        Commands::StartAll => {
            let report = manager.start_all().await;
            println!("{}", render::batch_report(&report));
            if !report.failed().is_empty() {
                bail!("{} server(s) failed to start", report.failed().len());
            }
        }
        Commands::StopAll => {
            let report = manager.stop_all().await;
            println!("{}", render::batch_report(&report));
        }
        Commands::Ssh { target } => {
            let launcher = launcher?;
            let id = manager.resolve_id(&target);
            let code = if manager.contains(&id) {
                manager.open_session(&id, &launcher).await?
            } else {
                let target =
                    SshTarget::parse(&target, &config.ssh.default_user, config.ssh.default_port)?;
                launcher.open_interactive_session(&target).await?
            };
            if code != 0 {
                std::process::exit(code);
            }
        }
    }

    Ok(())
}
