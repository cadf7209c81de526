/// Error handling module for Server Manager.
///
/// This module defines the error types used throughout the library.
/// Every lifecycle operation reports failures as one of these variants so
/// the shell can render them as structured results instead of aborting.
///
/// # Example
///
/// ```
/// use server_manager::error::{Error, Result};
///
/// fn handle_error(result: Result<()>) {
///     match result {
///         Ok(_) => println!("Operation succeeded"),
///         Err(Error::NotFound(id)) => println!("Server '{}' is not registered", id),
///         Err(Error::AlreadyRunning(id)) => println!("Server '{}' is already online", id),
///         Err(Error::PersistenceFailure(msg)) => println!("Registry not saved: {}", msg),
///         Err(e) => println!("Other error: {}", e),
///     }
/// }
/// ```
use thiserror::Error;

/// Errors that can occur in the server-manager library.
///
/// Payloads are plain strings so results can be cloned into batch reports
/// and compared in tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No entry with this id exists in the registry.
    #[error("Server not found: {0}")]
    NotFound(String),

    /// An entry with this id already exists.
    #[error("Server already exists: {0}")]
    DuplicateEntry(String),

    /// The entry is online after reconciliation.
    #[error("Server is already running: {0}")]
    AlreadyRunning(String),

    /// The entry is offline after reconciliation.
    #[error("Server is not running: {0}")]
    NotRunning(String),

    /// The entry has no launch command and is not an SSH target.
    #[error("Server has no launch command: {0}")]
    MissingCommand(String),

    /// The entry is an SSH-only target; it is reached through an
    /// interactive session, not started as a process.
    #[error("Server is an SSH-only target, open a session instead: {0}")]
    SessionOnly(String),

    /// A session was requested for an entry without an SSH host.
    #[error("Server has no SSH host configured: {0}")]
    NotSshTarget(String),

    /// The configured port already accepts connections.
    ///
    /// This error occurs when:
    /// - Another program is bound to the port
    /// - A previous instance survived outside the registry
    #[error("Port {port} is already in use (server {id})")]
    PortInUse {
        /// Entry being started
        id: String,
        /// Port that answered
        port: u16,
    },

    /// The launch command could not be split into program and arguments.
    #[error("Invalid launch command: {0}")]
    InvalidCommand(String),

    /// Error when spawning or signalling a local process.
    ///
    /// This error occurs when:
    /// - The program does not exist or is not executable
    /// - The working directory is missing
    /// - The process is owned by another user and cannot be signalled
    #[error("Server process error: {0}")]
    Process(String),

    /// The SSH session could not be established.
    ///
    /// This error occurs when:
    /// - The SSH client binary is missing
    /// - The host is unreachable or refuses the connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Reading or writing the registry document failed.
    ///
    /// When returned from a mutating operation the in-memory change has
    /// already been applied and stays authoritative for the session.
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// Failed to parse configuration from a file or string.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parsed but contains invalid values.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
}

impl Error {
    /// Stable name of the variant, used when rendering per-id result maps.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NotFound",
            Error::DuplicateEntry(_) => "DuplicateEntry",
            Error::AlreadyRunning(_) => "AlreadyRunning",
            Error::NotRunning(_) => "NotRunning",
            Error::MissingCommand(_) => "MissingCommand",
            Error::SessionOnly(_) => "SessionOnly",
            Error::NotSshTarget(_) => "NotSshTarget",
            Error::PortInUse { .. } => "PortInUse",
            Error::InvalidCommand(_) => "InvalidCommand",
            Error::Process(_) => "Process",
            Error::ConnectionFailed(_) => "ConnectionFailed",
            Error::PersistenceFailure(_) => "PersistenceFailure",
            Error::ConfigParse(_) => "ConfigParse",
            Error::ConfigInvalid(_) => "ConfigInvalid",
        }
    }
}

/// Result type for server-manager operations.
///
/// This is a convenience type alias for `std::result::Result` with the `Error` type
/// from this module.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_match_variants() {
        assert_eq!(Error::MissingCommand("a".into()).kind(), "MissingCommand");
        assert_eq!(
            Error::PortInUse {
                id: "a".into(),
                port: 8080
            }
            .kind(),
            "PortInUse"
        );
    }

    #[test]
    fn test_display_includes_id() {
        let err = Error::NotFound("server-10-0-0-38".to_string());
        assert_eq!(err.to_string(), "Server not found: server-10-0-0-38");
    }
}
