use chrono::{DateTime, Utc};

use super::TaskId;

/// The remote "currently running activity" as the session client last saw it
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Session {
    #[default]
    None,
    Running {
        task: TaskId,
        activity_id: i64,
        started_at: DateTime<Utc>,
    },
}

impl Session {
    pub fn is_running(&self) -> bool {
        matches!(self, Session::Running { .. })
    }

    pub fn task(&self) -> Option<&TaskId> {
        match self {
            Session::Running { task, .. } => Some(task),
            Session::None => None,
        }
    }

    pub fn activity_id(&self) -> Option<i64> {
        match self {
            Session::Running { activity_id, .. } => Some(*activity_id),
            Session::None => None,
        }
    }

    /// Seconds the activity has been running, if any
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        match self {
            Session::Running { started_at, .. } => Some((now - *started_at).num_seconds().max(0)),
            Session::None => None,
        }
    }
}
