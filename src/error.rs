use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum TrackError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid detection #{index}: {reason}")]
    InvalidDetection { index: usize, reason: String },
    #[error("Error: {0}")]
    LapjvError(String),
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
    #[error("track {0} is not held by the tracker")]
    UnknownTrack(usize),
}
