use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::Face;

/// Remote task reference: a Hackaru project plus optional description
///
/// `name` is the key the task was configured under and is only used for
/// display. Two task ids are the same task when project and description match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskId {
    pub name: String,
    pub project_id: i64,
    #[serde(default)]
    pub description: String,
}

impl TaskId {
    pub fn new(name: impl Into<String>, project_id: i64, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            project_id,
            description: description.into(),
        }
    }
}

impl PartialEq for TaskId {
    fn eq(&self, other: &Self) -> bool {
        self.project_id == other.project_id && self.description == other.description
    }
}

impl Eq for TaskId {}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (project {})", self.name, self.project_id)
    }
}

/// Face -> task assignment, fixed for the lifetime of the process
#[derive(Debug, Clone, Default)]
pub struct TaskMapping {
    faces: BTreeMap<Face, TaskId>,
}

impl TaskMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, face: Face, task: TaskId) -> Self {
        self.faces.insert(face, task);
        self
    }

    /// Task for a face, or `None` when the face means "idle"
    pub fn task_for(&self, face: Face) -> Option<&TaskId> {
        self.faces.get(&face)
    }

    /// Look up the configured name of a task matching a remote project/description
    pub fn find(&self, project_id: i64, description: &str) -> Option<&TaskId> {
        self.faces
            .values()
            .find(|t| t.project_id == project_id && t.description == description)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Face, &TaskId)> {
        self.faces.iter()
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

impl FromIterator<(Face, TaskId)> for TaskMapping {
    fn from_iter<I: IntoIterator<Item = (Face, TaskId)>>(iter: I) -> Self {
        Self {
            faces: iter.into_iter().collect(),
        }
    }
}
