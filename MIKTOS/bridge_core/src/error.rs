use thiserror::Error;

use crate::skills::RegistryError;

/// Failures the pipeline cannot express as a command response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// No session with this id is open.
    #[error("unknown session '{0}'")]
    UnknownSession(String),
    /// Session is executing a command and the policy or queue depth
    /// forbids waiting.
    #[error("session '{session}' is busy ({waiting} command(s) waiting)")]
    Busy {
        /// Session id.
        session: String,
        /// Commands queued at the time of the refusal.
        waiting: usize,
    },
    /// Skill registration or routing failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Configuration cannot be used.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    /// Machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownSession(_) => "UNKNOWN_SESSION",
            Self::Busy { .. } => "BUSY",
            Self::Registry(err) => err.code(),
            Self::Config(_) => "CONFIG",
        }
    }
}
