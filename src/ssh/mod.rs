//! Remote session launcher.
//!
//! Opening an SSH session is a foreground takeover: the client inherits the
//! terminal and the whole tool blocks until the session ends. This is the
//! one place where the tool is not responsive to anything else. No state is
//! kept and failed connections are never retried automatically.
//!
//! # Examples
//!
//! ```no_run
//! use server_manager::ssh::{SessionLauncher, SshLauncher, SshTarget};
//!
//! # async fn run() -> server_manager::Result<()> {
//! let launcher = SshLauncher::detect("ssh")?;
//! let target = SshTarget::parse("root@10.0.0.38", "root", 22)?;
//! let code = launcher.open_interactive_session(&target).await?;
//! println!("session exited with {}", code);
//! # Ok(())
//! # }
//! ```
use crate::error::{Error, Result};
use async_process::{Command, Stdio};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;

/// Exit status the OpenSSH client uses for connection errors.
const SSH_CONNECTION_ERROR: i32 = 255;

/// User, host and port of an SSH session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    /// Remote user
    pub user: String,
    /// Host name or address
    pub host: String,
    /// SSH port
    pub port: u16,
}

impl SshTarget {
    /// Parse `[user@]host[:port]`, filling in defaults.
    ///
    /// ```
    /// use server_manager::ssh::SshTarget;
    ///
    /// let target = SshTarget::parse("admin@10.0.0.38:2222", "root", 22).unwrap();
    /// assert_eq!(target.user, "admin");
    /// assert_eq!(target.port, 2222);
    ///
    /// let target = SshTarget::parse("10.0.0.38", "root", 22).unwrap();
    /// assert_eq!(target.to_string(), "root@10.0.0.38:22");
    /// ```
    pub fn parse(input: &str, default_user: &str, default_port: u16) -> Result<Self> {
        let input = input.trim();
        let (user, rest) = match input.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (user.to_string(), rest),
            Some((_, rest)) => (default_user.to_string(), rest),
            None => (default_user.to_string(), input),
        };

        // Bracketed IPv6 with a port, or a single colon before the port.
        let (host, port) = if let Some(stripped) = rest.strip_prefix('[') {
            match stripped.split_once(']') {
                Some((host, tail)) => (host.to_string(), tail.strip_prefix(':')),
                None => {
                    return Err(Error::ConnectionFailed(format!(
                        "Invalid SSH address: {}",
                        input
                    )));
                }
            }
        } else if rest.matches(':').count() == 1 {
            let (host, port) = rest.split_once(':').unwrap_or((rest, ""));
            (host.to_string(), Some(port))
        } else {
            (rest.to_string(), None)
        };

        if host.is_empty() {
            return Err(Error::ConnectionFailed(format!(
                "Invalid SSH address: {}",
                input
            )));
        }

        let port = match port {
            Some(port) => port.parse::<u16>().ok().filter(|p| *p != 0).ok_or_else(|| {
                Error::ConnectionFailed(format!("Invalid SSH port in: {}", input))
            })?,
            None => default_port,
        };

        Ok(Self { user, host, port })
    }

    /// The current user on this machine's own host name.
    pub fn local(default_port: u16) -> Self {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "root".to_string());
        Self {
            user,
            host: local_host_name(),
            port: default_port,
        }
    }

    /// `user@host`
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

impl fmt::Display for SshTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

#[cfg(unix)]
fn local_host_name() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(not(unix))]
fn local_host_name() -> String {
    sysinfo::System::host_name().unwrap_or_else(|| "localhost".to_string())
}

/// Opens interactive remote sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Hand the terminal to a session on `target` and wait for it to end.
    ///
    /// Returns the client's exit code. Fails with `ConnectionFailed` when
    /// the client cannot be launched or cannot connect.
    async fn open_interactive_session(&self, target: &SshTarget) -> Result<i32>;
}

/// Launcher backed by the OpenSSH command line client.
#[derive(Debug, Clone)]
pub struct SshLauncher {
    client: PathBuf,
}

impl SshLauncher {
    /// Use `client` as given, without checking that it exists.
    pub fn new(client: impl Into<PathBuf>) -> Self {
        Self {
            client: client.into(),
        }
    }

    /// Resolve `client` on `PATH`.
    ///
    /// This is the startup capability check; a missing client is reported
    /// as `ConnectionFailed`.
    pub fn detect(client: &str) -> Result<Self> {
        let path = which::which(client).map_err(|e| {
            Error::ConnectionFailed(format!("SSH client '{}' not available: {}", client, e))
        })?;
        tracing::debug!(client = ?path, "Found SSH client");
        Ok(Self::new(path))
    }

    /// Resolved client path
    pub fn client(&self) -> &std::path::Path {
        &self.client
    }
}

#[async_trait]
impl SessionLauncher for SshLauncher {
    #[tracing::instrument(skip(self), fields(target = %target))]
    async fn open_interactive_session(&self, target: &SshTarget) -> Result<i32> {
        tracing::info!("Opening interactive SSH session");

        let status = Command::new(&self.client)
            .arg("-p")
            .arg(target.port.to_string())
            .arg(target.destination())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to launch SSH client");
                Error::ConnectionFailed(format!(
                    "Failed to launch {}: {}",
                    self.client.display(),
                    e
                ))
            })?;

        match status.code() {
            Some(SSH_CONNECTION_ERROR) => {
                tracing::warn!("SSH client reported a connection error");
                Err(Error::ConnectionFailed(format!(
                    "Could not connect to {}",
                    target
                )))
            }
            Some(code) => {
                tracing::info!(code, "SSH session ended");
                Ok(code)
            }
            None => {
                tracing::warn!("SSH client terminated by a signal");
                Ok(-1)
            }
        }
    }
}
