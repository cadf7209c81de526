use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::fmt;

/// Maximum number of events kept in memory.
const MAX_EVENTS: usize = 1000;

/// Server lifecycle event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerLifecycleEvent {
    /// Entry added to the registry
    Added,
    /// Entry removed from the registry
    Removed,
    /// Process started
    Started,
    /// Process stopped
    Stopped,
    /// Process restarted
    Restarted,
    /// Process found dead during reconciliation
    Vanished,
    /// An operation on the entry failed
    Failed,
    /// An interactive SSH session ended
    SessionEnded,
}

impl fmt::Display for ServerLifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerLifecycleEvent::Added => "added",
            ServerLifecycleEvent::Removed => "removed",
            ServerLifecycleEvent::Started => "started",
            ServerLifecycleEvent::Stopped => "stopped",
            ServerLifecycleEvent::Restarted => "restarted",
            ServerLifecycleEvent::Vanished => "vanished",
            ServerLifecycleEvent::Failed => "failed",
            ServerLifecycleEvent::SessionEnded => "session ended",
        };
        f.write_str(name)
    }
}

/// Server lifecycle event
#[derive(Debug, Clone)]
pub struct ServerEvent {
    /// Server ID
    pub id: String,
    /// Event type
    pub event: ServerLifecycleEvent,
    /// Event timestamp
    pub timestamp: DateTime<Local>,
    /// Event details
    pub details: Option<String>,
}

/// Bounded history of lifecycle events for the current session.
///
/// Not persisted; the registry only records the latest state.
#[derive(Debug, Default)]
pub struct EventLog {
    events: VecDeque<ServerEvent>,
}

impl EventLog {
    /// Create an empty event log
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a server event
    pub fn record(&mut self, id: &str, event: ServerLifecycleEvent, details: Option<String>) {
        tracing::trace!(server_id = %id, %event, "Recording lifecycle event");
        self.events.push_back(ServerEvent {
            id: id.to_string(),
            event,
            timestamp: Local::now(),
            details,
        });

        if self.events.len() > MAX_EVENTS {
            self.events.pop_front();
        }
    }

    /// Recent events, newest first, optionally for one server only.
    pub fn recent(&self, id: Option<&str>, limit: Option<usize>) -> Vec<ServerEvent> {
        self.events
            .iter()
            .rev()
            .filter(|e| id.is_none_or(|id| e.id == id))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
