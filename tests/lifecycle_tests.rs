#![cfg(unix)]

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use server_manager::config::SeedEntry;
use server_manager::error::{Error, Result};
use server_manager::registry::{JsonFileStore, RegistryStore, ServerConfig, ServerStatus};
use server_manager::server::{LifecycleManager, LifecycleSettings, ProcessProbe, SystemProbe};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

fn settings() -> LifecycleSettings {
    LifecycleSettings {
        stop_grace_period: Duration::from_millis(500),
        restart_delay: Duration::ZERO,
        check_port_before_start: false,
        log_dir: None,
        ssh_default_user: "root".to_string(),
        ssh_default_port: 22,
    }
}

fn open(path: &Path, settings: LifecycleSettings, seed: &[SeedEntry]) -> Result<LifecycleManager> {
    LifecycleManager::open(
        Box::new(JsonFileStore::new(path)),
        Box::new(SystemProbe::new()),
        settings,
        seed,
    )
}

fn registry(dir: &TempDir) -> PathBuf {
    dir.path().join("servers.json")
}

fn sleeper(name: &str) -> ServerConfig {
    ServerConfig {
        name: name.to_string(),
        command: Some("sleep 30".to_string()),
        ..ServerConfig::default()
    }
}

/// Poll until the probe agrees the pid is gone.
async fn wait_until_dead(pid: u32) {
    let probe = SystemProbe::new();
    for _ in 0..50 {
        if !probe.is_alive(pid) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("pid {} still alive", pid);
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let mut manager = open(&registry(&dir), settings(), &[])?;

    assert!(matches!(manager.status("ghost"), Err(Error::NotFound(_))));
    assert!(matches!(manager.start("ghost").await, Err(Error::NotFound(_))));
    assert!(matches!(manager.stop("ghost").await, Err(Error::NotFound(_))));
    assert!(matches!(manager.restart("ghost").await, Err(Error::NotFound(_))));
    assert!(matches!(manager.remove("ghost").await, Err(Error::NotFound(_))));
    assert!(manager.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_duplicate_add_leaves_registry_unchanged() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let mut manager = open(&registry(&dir), settings(), &[])?;

    manager.add("web", sleeper("first"))?;
    let err = manager.add("web", sleeper("second")).unwrap_err();
    assert_eq!(err, Error::DuplicateEntry("web".to_string()));

    assert_eq!(manager.len(), 1);
    assert_eq!(manager.status("web")?.name, "first");
    Ok(())
}

#[tokio::test]
async fn test_seed_only_on_first_run() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = registry(&dir);
    let seed = vec![SeedEntry {
        id: "server-10-0-0-38".to_string(),
        server: sleeper("Server 10.0.0.38"),
    }];

    let mut manager = open(&path, settings(), &seed)?;
    assert_eq!(manager.ids(), vec!["server-10-0-0-38"]);
    manager.remove("server-10-0-0-38").await?;
    drop(manager);

    let manager = open(&path, settings(), &seed)?;
    assert!(manager.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_start_stop_persists_every_transition() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = registry(&dir);
    let mut manager = open(&path, settings(), &[])?;

    manager.add(
        "server-10-0-0-38",
        ServerConfig {
            port: Some(8080),
            ..sleeper("Server 10.0.0.38")
        },
    )?;

    let started = manager.start("server-10-0-0-38").await?;
    assert_eq!(started.status, ServerStatus::Online);
    let pid = started.pid.expect("pid recorded");
    assert!(SystemProbe::new().is_alive(pid));

    let stored = JsonFileStore::new(&path).load()?;
    assert_eq!(stored[0].status, ServerStatus::Online);
    assert_eq!(stored[0].pid, Some(pid));

    assert!(matches!(
        manager.start("server-10-0-0-38").await,
        Err(Error::AlreadyRunning(_))
    ));

    let stopped = manager.stop("server-10-0-0-38").await?;
    assert_eq!(stopped.status, ServerStatus::Offline);
    assert_eq!(stopped.pid, None);
    wait_until_dead(pid).await;

    let stored = JsonFileStore::new(&path).load()?;
    assert_eq!(stored[0].status, ServerStatus::Offline);

    assert!(matches!(
        manager.stop("server-10-0-0-38").await,
        Err(Error::NotRunning(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_external_kill_is_reconciled() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = registry(&dir);
    let mut manager = open(&path, settings(), &[])?;

    manager.add("worker", sleeper("Worker"))?;
    let pid = manager.start("worker").await?.pid.expect("pid recorded");

    kill(Pid::from_raw(pid as i32), Signal::SIGKILL).unwrap();
    wait_until_dead(pid).await;

    let entry = manager.status("worker")?;
    assert_eq!(entry.status, ServerStatus::Offline);
    assert_eq!(entry.pid, None);

    // The correction was written through.
    let stored = JsonFileStore::new(&path).load()?;
    assert_eq!(stored[0].status, ServerStatus::Offline);

    assert!(matches!(manager.stop("worker").await, Err(Error::NotRunning(_))));
    Ok(())
}

#[tokio::test]
async fn test_stop_after_process_died_succeeds() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = registry(&dir);
    let mut manager = open(&path, settings(), &[])?;

    manager.add("worker", sleeper("Worker"))?;
    let pid = manager.start("worker").await?.pid.expect("pid recorded");

    kill(Pid::from_raw(pid as i32), Signal::SIGKILL).unwrap();
    wait_until_dead(pid).await;

    let entry = manager.stop("worker").await?;
    assert_eq!(entry.status, ServerStatus::Offline);
    assert_eq!(entry.pid, None);
    assert_eq!(JsonFileStore::new(&path).load()?[0].pid, None);
    Ok(())
}

#[tokio::test]
async fn test_stale_online_record_from_disk() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = registry(&dir);

    // A pid that cannot exist, recorded by an earlier run.
    std::fs::write(
        &path,
        r#"{ "old": { "name": "Old", "command": "sleep 30", "status": "online", "pid": 4194305 } }"#,
    )
    .unwrap();

    let mut manager = open(&path, settings(), &[])?;
    let listed = manager.list();
    assert_eq!(listed[0].status, ServerStatus::Offline);
    assert_eq!(listed[0].pid, None);
    Ok(())
}

#[tokio::test]
async fn test_restart_gives_new_pid() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let mut manager = open(&registry(&dir), settings(), &[])?;

    manager.add("web", sleeper("Web"))?;
    let first = manager.start("web").await?.pid.expect("pid recorded");

    let restarted = manager.restart("web").await?;
    let second = restarted.pid.expect("pid recorded");
    assert_eq!(restarted.status, ServerStatus::Online);
    assert_ne!(first, second);
    wait_until_dead(first).await;

    manager.stop("web").await?;
    wait_until_dead(second).await;
    Ok(())
}

#[tokio::test]
async fn test_restart_of_offline_entry_starts_it() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let mut manager = open(&registry(&dir), settings(), &[])?;

    manager.add("web", sleeper("Web"))?;
    let entry = manager.restart("web").await?;
    assert!(entry.is_online());

    manager.stop("web").await?;
    Ok(())
}

#[tokio::test]
async fn test_start_failures() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let mut manager = open(&registry(&dir), settings(), &[])?;

    manager.add("empty", ServerConfig::default())?;
    assert!(matches!(
        manager.start("empty").await,
        Err(Error::MissingCommand(_))
    ));

    manager.add(
        "broken",
        ServerConfig {
            command: Some("definitely-not-a-real-binary-3f9a --flag".to_string()),
            ..ServerConfig::default()
        },
    )?;
    assert!(matches!(manager.start("broken").await, Err(Error::Process(_))));
    assert_eq!(manager.status("broken")?.status, ServerStatus::Offline);
    Ok(())
}

#[tokio::test]
async fn test_port_in_use_blocks_start() -> Result<()> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let dir = TempDir::new().unwrap();
    let mut manager = open(
        &registry(&dir),
        LifecycleSettings {
            check_port_before_start: true,
            ..settings()
        },
        &[],
    )?;

    manager.add(
        "web",
        ServerConfig {
            port: Some(port),
            ..sleeper("Web")
        },
    )?;
    let err = manager.start("web").await.unwrap_err();
    assert_eq!(
        err,
        Error::PortInUse {
            id: "web".to_string(),
            port
        }
    );
    assert!(!manager.status("web")?.is_online());
    Ok(())
}

#[tokio::test]
async fn test_failed_restart_leaves_entry_offline() -> Result<()> {
    let port = {
        let free = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        free.local_addr().unwrap().port()
    };

    let dir = TempDir::new().unwrap();
    let path = registry(&dir);
    let mut manager = open(
        &path,
        LifecycleSettings {
            check_port_before_start: true,
            ..settings()
        },
        &[],
    )?;
    manager.add(
        "web",
        ServerConfig {
            port: Some(port),
            ..sleeper("Web")
        },
    )?;
    let pid = manager.start("web").await?.pid.expect("pid recorded");

    // Something else takes the port while the server is up.
    let _squatter = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();

    let err = manager.restart("web").await.unwrap_err();
    assert_eq!(
        err,
        Error::PortInUse {
            id: "web".to_string(),
            port
        }
    );
    wait_until_dead(pid).await;

    assert_eq!(manager.status("web")?.status, ServerStatus::Offline);
    let on_disk = JsonFileStore::new(&path).load()?;
    assert_eq!(on_disk[0].status, ServerStatus::Offline);
    assert_eq!(on_disk[0].pid, None);
    Ok(())
}

#[tokio::test]
async fn test_start_all_reports_each_entry() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let mut manager = open(&registry(&dir), settings(), &[])?;

    manager.add("a", sleeper("A"))?;
    manager.add("b", ServerConfig::default())?;
    manager.add("c", sleeper("C"))?;

    let report = manager.start_all().await;
    assert_eq!(report.succeeded(), vec!["a", "c"]);
    let failed = report.failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, "b");
    assert!(matches!(failed[0].1, Error::MissingCommand(_)));

    assert!(manager.status("a")?.is_online());
    assert!(!manager.status("b")?.is_online());
    assert!(manager.status("c")?.is_online());

    let report = manager.stop_all().await;
    assert_eq!(report.succeeded(), vec!["a", "c"]);
    assert!(matches!(report.get("b"), Some(Err(Error::NotRunning(_)))));
    assert!(manager.list().iter().all(|e| !e.is_online()));
    Ok(())
}

#[tokio::test]
async fn test_remove_stops_running_process() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = registry(&dir);
    let mut manager = open(&path, settings(), &[])?;

    manager.add("web", sleeper("Web"))?;
    let pid = manager.start("web").await?.pid.expect("pid recorded");

    manager.remove("web").await?;
    wait_until_dead(pid).await;
    assert!(!manager.contains("web"));
    assert!(JsonFileStore::new(&path).load()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_auto_start_entries() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let mut manager = open(&registry(&dir), settings(), &[])?;

    manager.add(
        "auto",
        ServerConfig {
            auto_start: true,
            ..sleeper("Auto")
        },
    )?;
    manager.add("manual", sleeper("Manual"))?;

    let report = manager.start_auto().await;
    assert_eq!(report.succeeded(), vec!["auto"]);
    assert!(!manager.status("manual")?.is_online());

    // Already running entries are skipped.
    assert!(manager.start_auto().await.outcomes.is_empty());

    manager.stop_all().await;
    Ok(())
}

#[tokio::test]
async fn test_events_are_recorded() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let mut manager = open(&registry(&dir), settings(), &[])?;

    manager.add("web", sleeper("Web"))?;
    manager.start("web").await?;
    manager.stop("web").await?;

    let events: Vec<String> = manager
        .events(Some("web"), None)
        .iter()
        .map(|e| e.event.to_string())
        .collect();
    assert_eq!(events.len(), 3);
    assert_eq!(manager.events(None, Some(1)).len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_working_directory_and_logs() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let logs = dir.path().join("logs");
    let mut manager = open(
        &registry(&dir),
        LifecycleSettings {
            log_dir: Some(logs.clone()),
            ..settings()
        },
        &[],
    )?;

    manager.add(
        "pwd",
        ServerConfig {
            command: Some("pwd".to_string()),
            working_directory: Some(dir.path().to_path_buf()),
            ..ServerConfig::default()
        },
    )?;
    let pid = manager.start("pwd").await?.pid.expect("pid recorded");
    wait_until_dead(pid).await;

    let output = std::fs::read_to_string(logs.join("pwd.log")).unwrap();
    let expected = dir.path().canonicalize().unwrap();
    assert_eq!(
        Path::new(output.trim()).canonicalize().unwrap(),
        expected
    );

    // The process exited on its own; status catches up on the next read.
    assert_eq!(manager.status("pwd")?.status, ServerStatus::Offline);
    Ok(())
}
