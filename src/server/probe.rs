/// Liveness check for recorded process ids.
///
/// Implementations must never fail: a pid that never existed or already
/// exited is simply not alive. A process that exists but belongs to another
/// user is alive; existence is tested, not controllability.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessProbe: Send + Sync {
    /// Whether a process with this pid currently exists.
    fn is_alive(&self, pid: u32) -> bool;
}

/// Probe backed by the host's process table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl SystemProbe {
    /// Create a new probe
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
impl ProcessProbe for SystemProbe {
    fn is_alive(&self, pid: u32) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};

        let Some(nix_pid) = validate_pid(pid) else {
            return false;
        };

        // Children we spawned linger as zombies until reaped and would still
        // answer signal 0.
        match waitpid(nix_pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => return true,
            Ok(status) => {
                tracing::debug!(pid, ?status, "Reaped exited child");
                return false;
            }
            Err(Errno::ECHILD) => {}
            Err(e) => tracing::trace!(pid, error = %e, "waitpid failed, falling back to signal 0"),
        }

        match kill(nix_pid, None) {
            Ok(()) => true,
            Err(Errno::ESRCH) => false,
            Err(Errno::EPERM) => true,
            Err(e) => {
                tracing::debug!(pid, error = %e, "Unexpected error probing pid");
                false
            }
        }
    }
}

#[cfg(not(unix))]
impl ProcessProbe for SystemProbe {
    fn is_alive(&self, pid: u32) -> bool {
        use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

        if pid == 0 {
            return false;
        }
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing(),
        );
        system.process(pid).is_some()
    }
}

/// Convert a recorded pid into a signal target.
///
/// Rejects 0 (the caller's own process group) and values above `i32::MAX`,
/// which would turn into negative group ids.
#[cfg(unix)]
pub(crate) fn validate_pid(pid: u32) -> Option<nix::unistd::Pid> {
    if pid == 0 || pid > i32::MAX as u32 {
        return None;
    }
    Some(nix::unistd::Pid::from_raw(pid as i32))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_is_alive() {
        assert!(SystemProbe::new().is_alive(std::process::id()));
    }

    #[test]
    fn test_invalid_pids_are_dead() {
        let probe = SystemProbe::new();
        assert!(!probe.is_alive(0));
        assert!(!probe.is_alive(u32::MAX));
    }

    #[test]
    fn test_exited_child_is_dead() {
        let child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        // Let it exit without waiting so it becomes a zombie.
        std::thread::sleep(std::time::Duration::from_millis(200));
        assert!(!SystemProbe::new().is_alive(pid));
        assert!(!SystemProbe::new().is_alive(pid));
    }

    #[test]
    fn test_pid_one_exists() {
        // init belongs to root; EPERM still means alive.
        assert!(SystemProbe::new().is_alive(1));
    }
}
