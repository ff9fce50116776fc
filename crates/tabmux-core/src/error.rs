use crate::session::SessionId;

/// Errors from session multiplexing operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxError {
    /// A caller-supplied session ID is already in use.
    DuplicateId(SessionId),
    /// No live session has this ID (never opened, or already closed).
    UnknownSession(SessionId),
    /// Rows and cols must both be positive.
    InvalidGeometry { rows: u16, cols: u16 },
    /// The backend host reports the session's channel as dead.
    BackendUnavailable { id: SessionId, reason: String },
}

impl MuxError {
    pub fn backend(id: &SessionId, reason: impl Into<String>) -> Self {
        MuxError::BackendUnavailable {
            id: id.clone(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for MuxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MuxError::DuplicateId(id) => write!(f, "session {id} already exists"),
            MuxError::UnknownSession(id) => write!(f, "session {id} not found"),
            MuxError::InvalidGeometry { rows, cols } => {
                write!(f, "invalid geometry {rows}x{cols}: rows and cols must be positive")
            }
            MuxError::BackendUnavailable { id, reason } => {
                write!(f, "backend for session {id} unavailable: {reason}")
            }
        }
    }
}

impl std::error::Error for MuxError {}

/// Errors from importing settings.
#[derive(Debug)]
pub enum SettingsError {
    Json(serde_json::Error),
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Json(err) => write!(f, "settings JSON error: {err}"),
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SettingsError::Json(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(err: serde_json::Error) -> Self {
        SettingsError::Json(err)
    }
}
