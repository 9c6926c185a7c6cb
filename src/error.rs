/// Domain errors surfaced to the user through `anyhow`.
use crate::types::{EntryId, ProjectId, TaskId};

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("project '{0}' not found")]
    ProjectNameNotFound(String),

    #[error("project #{0} not found")]
    ProjectNotFound(ProjectId),

    #[error("project '{0}' already exists")]
    ProjectExists(String),

    #[error("task '{task}' not found in project '{project}'")]
    TaskNameNotFound { project: String, task: String },

    #[error("task '{task}' already exists in project '{project}'")]
    TaskExists { project: String, task: String },

    #[error("task #{0} not found")]
    TaskNotFound(TaskId),

    #[error("time entry #{0} not found")]
    EntryNotFound(EntryId),

    #[error("invalid color '{0}', expected #RRGGBB or #RRGGBBAA")]
    InvalidColor(String),

    #[error("life balance must be between 0 and 100, got {0}")]
    InvalidLifeBalance(u32),

    #[error("satisfaction score must be between 1 and 5, got {0}")]
    InvalidSatisfaction(u8),

    #[error("position {position} is out of range for a list of {len}")]
    PositionOutOfRange { position: usize, len: usize },

    #[error("flag store at {path} is corrupt: {reason}")]
    CorruptFlagStore { path: String, reason: String },
}
