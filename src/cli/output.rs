// Output formatting utilities

use chrono::{DateTime, Local, Utc};
use std::io::IsTerminal;

use crate::models::{Session, TaskMapping};
use crate::utils::format_duration;

const ANSI_BOLD: &str = "\x1b[1m";
const ANSI_RESET: &str = "\x1b[0m";

/// Check if stdout is a terminal (TTY)
pub fn is_tty() -> bool {
    std::io::stdout().is_terminal()
}

/// Apply bold formatting if in TTY mode
fn bold_if_tty(text: &str, is_tty: bool) -> String {
    if is_tty {
        format!("{}{}{}", ANSI_BOLD, text, ANSI_RESET)
    } else {
        text.to_string()
    }
}

/// Format timestamp for display in local time
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Face -> task table for `check` and `status`
pub fn format_mapping_table(mapping: &TaskMapping, is_tty: bool) -> String {
    if mapping.is_empty() {
        return "No faces mapped.".to_string();
    }

    let mut out = String::new();
    let header = format!("{:<6} {:<20} {:<10} {}", "Face", "Task", "Project", "Description");
    out.push_str(&bold_if_tty(&header, is_tty));
    out.push('\n');
    out.push_str(&"-".repeat(60));
    out.push('\n');

    for (face, task) in mapping.iter() {
        let name = if task.name.chars().count() > 19 {
            format!("{}..", task.name.chars().take(17).collect::<String>())
        } else {
            task.name.clone()
        };
        out.push_str(&format!(
            "{:<6} {:<20} {:<10} {}\n",
            face.value(),
            name,
            task.project_id,
            task.description
        ));
    }
    out
}

/// One-line summary of the remote session
pub fn format_session(session: &Session, now: DateTime<Utc>) -> String {
    match session {
        Session::None => "No activity running.".to_string(),
        Session::Running { task, started_at, .. } => format!(
            "Running: {} since {} ({})",
            task,
            format_timestamp(*started_at),
            format_duration(session.elapsed_secs(now).unwrap_or(0))
        ),
    }
}

/// Machine-readable form of the remote session
pub fn session_json(session: &Session, now: DateTime<Utc>) -> serde_json::Value {
    match session {
        Session::None => serde_json::json!({ "running": false }),
        Session::Running { task, activity_id, started_at } => serde_json::json!({
            "running": true,
            "task": task.name,
            "project_id": task.project_id,
            "description": task.description,
            "activity_id": activity_id,
            "started_at": started_at.to_rfc3339(),
            "elapsed_secs": session.elapsed_secs(now),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Face, TaskId};
    use chrono::Duration;

    #[test]
    fn test_mapping_table_lists_faces_in_order() {
        let mapping = TaskMapping::new()
            .with(Face(2), TaskId::new("review", 13, ""))
            .with(Face(1), TaskId::new("writing", 12, "Docs"));
        let table = format_mapping_table(&mapping, false);
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with("Face"));
        assert!(lines[2].starts_with("1 "));
        assert!(lines[2].contains("writing"));
        assert!(lines[2].contains("Docs"));
        assert!(lines[3].starts_with("2 "));
        assert!(!table.contains(ANSI_BOLD));
    }

    #[test]
    fn test_empty_mapping() {
        assert_eq!(format_mapping_table(&TaskMapping::new(), true), "No faces mapped.");
    }

    #[test]
    fn test_format_session() {
        let now = Utc::now();
        assert_eq!(format_session(&Session::None, now), "No activity running.");

        let running = Session::Running {
            task: TaskId::new("writing", 12, ""),
            activity_id: 3,
            started_at: now - Duration::seconds(125),
        };
        let line = format_session(&running, now);
        assert!(line.starts_with("Running: writing (project 12)"));
        assert!(line.ends_with("(2m5s)"));
    }

    #[test]
    fn test_session_json() {
        let now = Utc::now();
        assert_eq!(session_json(&Session::None, now)["running"], false);

        let running = Session::Running {
            task: TaskId::new("writing", 12, ""),
            activity_id: 3,
            started_at: now - Duration::seconds(60),
        };
        let json = session_json(&running, now);
        assert_eq!(json["activity_id"], 3);
        assert_eq!(json["elapsed_secs"], 60);
    }
}
