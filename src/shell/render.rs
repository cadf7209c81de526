//! Plain-text rendering of manager results.

use crate::registry::{LaunchMode, ServerEntry, ServerStatus};
use crate::server::monitor::format_bytes;
use crate::server::{AdminReport, BatchReport, ProcessUsage, ServerEvent};
use std::fmt::Write;
use std::time::Duration;

const RULE_WIDTH: usize = 80;

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

fn status_marker(status: ServerStatus) -> &'static str {
    match status {
        ServerStatus::Online => "[+]",
        ServerStatus::Offline => "[-]",
    }
}

/// Registry table: id, port, status, pid, description.
pub fn entry_table(entries: &[ServerEntry]) -> String {
    if entries.is_empty() {
        return "No servers configured.".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(
        out,
        "{:<24} {:<7} {:<12} {:<8} {}",
        "ID", "PORT", "STATUS", "PID", "DESCRIPTION"
    );
    let _ = writeln!(out, "{}", rule());
    for entry in entries {
        let port = entry.port.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
        let pid = entry.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
        let ssh = if entry.mode == LaunchMode::Ssh { " (ssh)" } else { "" };
        let _ = writeln!(
            out,
            "{:<24} {:<7} {} {:<8} {:<8} {}{}",
            entry.id,
            port,
            status_marker(entry.status),
            entry.status,
            pid,
            entry.description,
            ssh
        );
    }
    let _ = write!(out, "{}", rule());
    out
}

/// All fields of one entry.
pub fn entry_details(entry: &ServerEntry) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Server:      {}", entry.id);
    let _ = writeln!(out, "Name:        {}", entry.label());
    let _ = writeln!(
        out,
        "Status:      {} {}",
        status_marker(entry.status),
        entry.status
    );
    let _ = writeln!(
        out,
        "PID:         {}",
        entry.pid.map(|p| p.to_string()).unwrap_or_else(|| "N/A".into())
    );
    let _ = writeln!(
        out,
        "Port:        {}",
        entry.port.map(|p| p.to_string()).unwrap_or_else(|| "N/A".into())
    );
    let _ = writeln!(
        out,
        "Command:     {}",
        entry.command.as_deref().unwrap_or("N/A")
    );
    if let Some(dir) = &entry.working_directory {
        let _ = writeln!(out, "Directory:   {}", dir.display());
    }
    if entry.mode == LaunchMode::Ssh {
        let _ = writeln!(
            out,
            "SSH host:    {}",
            entry.host.as_deref().unwrap_or("N/A")
        );
    }
    let _ = writeln!(
        out,
        "Auto-start:  {}",
        if entry.auto_start { "yes" } else { "no" }
    );
    let _ = write!(out, "Description: {}", entry.description);
    out
}

/// One line per id: `ok` or the error kind and message.
pub fn batch_report(report: &BatchReport) -> String {
    if report.outcomes.is_empty() {
        return "Nothing to do.".to_string();
    }

    let mut out = String::new();
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(entry) => {
                let pid = entry
                    .pid
                    .map(|p| format!(" (pid {})", p))
                    .unwrap_or_default();
                let _ = writeln!(out, "  {:<24} ok {}{}", outcome.id, entry.status, pid);
            }
            Err(e) => {
                let _ = writeln!(out, "  {:<24} {}: {}", outcome.id, e.kind(), e);
            }
        }
    }
    let _ = write!(
        out,
        "{} succeeded, {} failed",
        report.succeeded().len(),
        report.failed().len()
    );
    out
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (days, hours, minutes) = (secs / 86_400, (secs % 86_400) / 3600, (secs % 3600) / 60);
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m {}s", minutes, secs % 60)
    }
}

/// Administration report of one entry and its host.
pub fn admin_report(report: &AdminReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "{}", entry_details(&report.entry));
    let _ = writeln!(out, "{}", rule());

    match &report.process {
        ProcessUsage::Available(stats) => {
            let _ = writeln!(out, "Process:     {} (pid {})", stats.name, stats.pid);
            let _ = writeln!(out, "CPU:         {:.1}%", stats.cpu_percent);
            let _ = writeln!(out, "Memory:      {}", format_bytes(stats.memory_bytes));
            let _ = writeln!(out, "Running for: {}", format_duration(stats.run_time));
        }
        ProcessUsage::Unavailable => {
            let _ = writeln!(out, "Process:     unavailable (not running)");
        }
    }
    if let Some(in_use) = report.port_in_use {
        let _ = writeln!(
            out,
            "Port state:  {}",
            if in_use { "in use" } else { "free" }
        );
    }

    let host = &report.host;
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(
        out,
        "Host:        {}",
        host.host_name.as_deref().unwrap_or("unknown")
    );
    let _ = writeln!(
        out,
        "Memory:      {} used of {}",
        format_bytes(host.used_memory),
        format_bytes(host.total_memory)
    );
    let _ = writeln!(
        out,
        "Load:        {:.2} {:.2} {:.2}",
        host.load_average[0], host.load_average[1], host.load_average[2]
    );
    let _ = writeln!(out, "Uptime:      {}", format_duration(host.uptime));
    for disk in &host.disks {
        let _ = writeln!(
            out,
            "Disk:        {:<20} {} free of {}",
            disk.mount_point.display(),
            format_bytes(disk.available_bytes),
            format_bytes(disk.total_bytes)
        );
    }
    let _ = write!(out, "{}", rule());
    out
}

/// Event history, newest first.
pub fn events(events: &[ServerEvent]) -> String {
    if events.is_empty() {
        return "No events recorded in this session.".to_string();
    }

    events
        .iter()
        .map(|e| {
            let details = e
                .details
                .as_deref()
                .map(|d| format!(" ({})", d))
                .unwrap_or_default();
            format!(
                "  {} {:<24} {}{}",
                e.timestamp.format("%H:%M:%S"),
                e.id,
                e.event,
                details
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::registry::ServerConfig;
    use crate::server::BatchOutcome;

    #[test]
    fn test_empty_table() {
        assert_eq!(entry_table(&[]), "No servers configured.");
    }

    #[test]
    fn test_table_lists_every_entry() {
        let mut online = ServerEntry::new("server-10-0-0-38", ServerConfig::default());
        online.mark_online(1234);
        let offline = ServerEntry::new("api", ServerConfig::default());

        let table = entry_table(&[online, offline]);
        assert!(table.contains("server-10-0-0-38"));
        assert!(table.contains("1234"));
        assert!(table.contains("api"));
        assert!(table.contains("offline"));
    }

    #[test]
    fn test_batch_report_shows_error_kind() {
        let report = BatchReport {
            outcomes: vec![
                BatchOutcome {
                    id: "a".to_string(),
                    result: Ok(ServerEntry::new("a", ServerConfig::default())),
                },
                BatchOutcome {
                    id: "b".to_string(),
                    result: Err(Error::MissingCommand("b".to_string())),
                },
            ],
        };
        let text = batch_report(&report);
        assert!(text.contains("MissingCommand"));
        assert!(text.ends_with("1 succeeded, 1 failed"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0m 59s");
        assert_eq!(format_duration(Duration::from_secs(3_660)), "1h 1m");
        assert_eq!(format_duration(Duration::from_secs(90_000)), "1d 1h 0m");
    }
}
