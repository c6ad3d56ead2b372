//! Error types for the alarm pipeline.
//!
//! None of these are fatal: persistence and playback failures are
//! recovered locally, validation failures abort the operation before
//! any state changes.

/// Error taxonomy of the core.
#[derive(Debug, thiserror::Error)]
pub enum ChimeError {
    /// Reading or writing the persisted task blob failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Sound output was blocked or the audio device failed.
    #[error("playback error: {0}")]
    Playback(String),

    /// User input was rejected.
    #[error("{0}")]
    Validation(String),
}

impl ChimeError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ChimeError>;
