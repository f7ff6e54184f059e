//! Error taxonomy surfaced by the session service.

use serde::Serialize;
use thiserror::Error;

/// Failures of a session-level request.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Missing or empty frame source, undecodable first frame, bad parameter.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unknown session id, or an artifact that should exist is gone.
    #[error("not found: {0}")]
    NotFound(String),

    /// Job stopped by shutdown before it finished.
    #[error("session cancelled: {0}")]
    Cancelled(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Failure scoped to a single frame. Logged and recorded, never surfaced.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("pose estimation failed: {0}")]
    Estimator(String),

    #[error("landmark {0} missing from pose")]
    MissingLandmark(&'static str),

    #[error("landmark {name} has non-finite coordinates ({x}, {y})")]
    NonFiniteLandmark { name: &'static str, x: f64, y: f64 },

    #[error("phase classification failed: {0}")]
    Classifier(String),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Cancelled,
    Internal,
}

/// Serializable error payload returned by command handlers.
#[derive(Debug, Clone, Serialize)]
pub struct CommandError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<SessionError> for CommandError {
    fn from(err: SessionError) -> Self {
        let kind = match &err {
            SessionError::InvalidInput(_) => ErrorKind::InvalidInput,
            SessionError::NotFound(_) => ErrorKind::NotFound,
            SessionError::Cancelled(_) => ErrorKind::Cancelled,
            SessionError::Internal(_) => ErrorKind::Internal,
        };
        Self {
            kind,
            message: format!("{err:#}"),
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_error_keeps_kind_and_message() {
        let err = CommandError::from(SessionError::NotFound("session abc".into()));
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.message, "not found: session abc");
    }

    #[test]
    fn internal_errors_include_context_chain() {
        let source = anyhow::anyhow!("disk full").context("failed to write csv");
        let err = CommandError::from(SessionError::from(source));
        assert_eq!(err.kind, ErrorKind::Internal);
        assert!(err.message.contains("failed to write csv"));
        assert!(err.message.contains("disk full"));
    }
}
