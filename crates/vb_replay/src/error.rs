use thiserror::Error;

/// Load-boundary errors. Steady-state playback never surfaces errors to the
/// rendering layer; anomalies inside a running session degrade to a
/// best-effort deterministic continuation instead.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("invalid match payload: {0}")]
    InvalidPayload(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ReplayError {
    fn from(e: serde_json::Error) -> Self {
        ReplayError::InvalidPayload(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReplayError>;
