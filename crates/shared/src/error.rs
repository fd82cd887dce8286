use thiserror::Error;

/// Reasons a state document is rejected instead of becoming a snapshot.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotError {
    #[error("state document is not valid JSON for a controller snapshot: {0}")]
    Decode(String),
    #[error("cooldown must be a non-negative number of seconds, got {0}")]
    InvalidCooldown(f64),
    #[error("timestamp field `{field}` is not finite")]
    NonFiniteTimestamp { field: &'static str },
}

impl From<serde_json::Error> for SnapshotError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}
