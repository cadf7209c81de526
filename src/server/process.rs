// src/server/process.rs
use crate::error::{Error, Result};
use crate::registry::ServerEntry;
use crate::server::probe::ProcessProbe;
use std::fs::OpenOptions;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio::net::TcpStream;

/// Interval between liveness checks while waiting for a process to exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Connect timeout of the port-in-use check.
const PORT_PROBE_TIMEOUT: Duration = Duration::from_millis(300);

/// Split a launch command into program and arguments.
pub fn parse_command(id: &str, command: &str) -> Result<(String, Vec<String>)> {
    let mut parts = shell_words::split(command)
        .map_err(|e| Error::InvalidCommand(format!("{}: {}", id, e)))?;
    if parts.is_empty() {
        return Err(Error::MissingCommand(id.to_string()));
    }
    let program = parts.remove(0);
    Ok((program, parts))
}

/// Start the entry's command detached from the manager and return its pid.
///
/// The child gets its own session, so it survives the manager exiting and
/// does not receive the terminal's Ctrl-C. Its output goes to
/// `<log_dir>/<id>.log` when a log directory is given, otherwise it is
/// discarded. The `Child` handle is dropped without waiting; the probe reaps
/// the process once it exits.
pub fn spawn_detached(entry: &ServerEntry, log_dir: Option<&Path>) -> Result<u32> {
    let command = entry
        .command
        .as_deref()
        .ok_or_else(|| Error::MissingCommand(entry.id.clone()))?;
    let (program, args) = parse_command(&entry.id, command)?;

    let mut cmd = Command::new(&program);
    cmd.args(&args).stdin(Stdio::null());

    if let Some(dir) = &entry.working_directory {
        cmd.current_dir(dir);
    }

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .map_err(|e| Error::Process(format!("Failed to create log directory: {}", e)))?;
            let log_path = dir.join(format!("{}.log", entry.id));
            let log = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .map_err(|e| Error::Process(format!("Failed to open log file: {}", e)))?;
            let log_err = log
                .try_clone()
                .map_err(|e| Error::Process(format!("Failed to open log file: {}", e)))?;
            cmd.stdout(Stdio::from(log)).stderr(Stdio::from(log_err));
        }
        None => {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;

        // SAFETY: the closure runs in the child between fork and exec and
        // only calls setsid(2), which is async-signal-safe.
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid()
                    .map(|_| ())
                    .map_err(std::io::Error::from)
            });
        }
    }

    let child = cmd
        .spawn()
        .map_err(|e| Error::Process(format!("Failed to start '{}': {}", program, e)))?;
    let pid = child.id();
    drop(child);

    tracing::debug!(server_id = %entry.id, pid, program = %program, "Spawned detached process");
    Ok(pid)
}

/// Terminate a process and its process group.
///
/// Sends SIGTERM, waits up to `grace` for the process to go away, then
/// sends SIGKILL. A pid that no longer exists counts as stopped.
#[cfg(unix)]
pub async fn terminate(pid: u32, grace: Duration, probe: &dyn ProcessProbe) -> Result<()> {
    use crate::server::probe::validate_pid;
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill, killpg};

    let Some(nix_pid) = validate_pid(pid) else {
        tracing::warn!(pid, "Refusing to signal invalid pid");
        return Ok(());
    };

    if !probe.is_alive(pid) {
        tracing::debug!(pid, "Process already gone");
        return Ok(());
    }

    // The child is a session leader, so its pid is also its group id.
    let sent = killpg(nix_pid, Signal::SIGTERM).or_else(|_| kill(nix_pid, Signal::SIGTERM));
    match sent {
        Ok(()) => {}
        Err(Errno::ESRCH) => return Ok(()),
        Err(e) => {
            return Err(Error::Process(format!(
                "Failed to signal pid {}: {}",
                pid, e
            )));
        }
    }

    let polls = (grace.as_millis() / EXIT_POLL_INTERVAL.as_millis()).max(1);
    for _ in 0..polls {
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        if !probe.is_alive(pid) {
            return Ok(());
        }
    }

    tracing::warn!(pid, ?grace, "Process did not exit after SIGTERM, sending SIGKILL");
    match killpg(nix_pid, Signal::SIGKILL).or_else(|_| kill(nix_pid, Signal::SIGKILL)) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => {
            return Err(Error::Process(format!(
                "Failed to kill pid {}: {}",
                pid, e
            )));
        }
    }

    for _ in 0..10 {
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        if !probe.is_alive(pid) {
            return Ok(());
        }
    }
    Err(Error::Process(format!("Pid {} survived SIGKILL", pid)))
}

/// Terminate a process.
#[cfg(not(unix))]
pub async fn terminate(pid: u32, grace: Duration, probe: &dyn ProcessProbe) -> Result<()> {
    use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

    if !probe.is_alive(pid) {
        return Ok(());
    }

    let sys_pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[sys_pid]),
        true,
        ProcessRefreshKind::nothing(),
    );
    if let Some(process) = system.process(sys_pid) {
        process.kill();
    }

    let polls = (grace.as_millis() / EXIT_POLL_INTERVAL.as_millis()).max(1);
    for _ in 0..polls {
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        if !probe.is_alive(pid) {
            return Ok(());
        }
    }
    Err(Error::Process(format!("Pid {} did not exit", pid)))
}

/// Whether something on this host accepts TCP connections on `port`.
pub async fn port_in_use(port: u16) -> bool {
    matches!(
        tokio::time::timeout(PORT_PROBE_TIMEOUT, TcpStream::connect(("127.0.0.1", port))).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_respects_quotes() {
        let (program, args) = parse_command("a", "python3 -c 'print(1)'").unwrap();
        assert_eq!(program, "python3");
        assert_eq!(args, vec!["-c", "print(1)"]);
    }

    #[test]
    fn test_parse_command_errors() {
        assert!(matches!(
            parse_command("a", "   "),
            Err(Error::MissingCommand(_))
        ));
        assert!(matches!(
            parse_command("a", "echo 'unterminated"),
            Err(Error::InvalidCommand(_))
        ));
    }

    #[tokio::test]
    async fn test_port_in_use_sees_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(port_in_use(port).await);
        drop(listener);
        assert!(!port_in_use(port).await);
    }
}
