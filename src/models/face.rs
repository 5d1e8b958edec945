use std::fmt;
use tokio::time::Instant;

/// Lowest face number the cube reports for a physical task side
pub const FIRST_TASK_FACE: u8 = 1;
/// Highest face number the cube reports for a physical task side
pub const LAST_TASK_FACE: u8 = 8;

/// One resting orientation of the cube, as reported by the device
///
/// The cube sends a single byte per orientation change. 1..=8 are the
/// labelled sides; anything else (0 when it stands on its base) has no task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Face(pub u8);

impl Face {
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Whether this is one of the labelled sides that can carry a task
    pub fn is_task_face(&self) -> bool {
        (FIRST_TASK_FACE..=LAST_TASK_FACE).contains(&self.0)
    }
}

impl From<u8> for Face {
    fn from(value: u8) -> Self {
        Face(value)
    }
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "face {}", self.0)
    }
}

/// A face the cube has settled on for at least the debounce window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StableFaceEvent {
    pub face: Face,
    /// When the face was first seen (start of the uninterrupted run)
    pub since: Instant,
}

impl StableFaceEvent {
    pub fn new(face: Face, since: Instant) -> Self {
        Self { face, since }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_faces() {
        assert!(!Face(0).is_task_face());
        assert!(Face(1).is_task_face());
        assert!(Face(8).is_task_face());
        assert!(!Face(9).is_task_face());
    }

    #[test]
    fn test_display() {
        assert_eq!(Face(3).to_string(), "face 3");
    }
}
