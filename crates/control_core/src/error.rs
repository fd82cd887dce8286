use shared::error::SnapshotError;
use thiserror::Error;

/// A poll that produced no usable snapshot. The previous snapshot stays current.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PollError {
    #[error("controller state unreachable: {0}")]
    Unreachable(String),
    #[error("controller state malformed: {0}")]
    Malformed(#[from] SnapshotError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("duration must be a positive whole number")]
    InvalidDuration,
    #[error("unknown duration unit `{0}` (expected s, min or h)")]
    UnknownUnit(String),
}
