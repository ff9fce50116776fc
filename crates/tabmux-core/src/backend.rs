//! Contract with the process host that owns the real shell processes.

use tokio::sync::mpsc;

use crate::error::MuxError;
use crate::session::{Geometry, SessionId};

/// Events produced by a backend host, keyed by session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendEvent {
    /// Bytes the session's process wrote, in production order.
    Output { id: SessionId, data: Vec<u8> },
    /// The session's process exited.
    Exited { id: SessionId, code: Option<u32> },
}

impl BackendEvent {
    pub fn id(&self) -> &SessionId {
        match self {
            BackendEvent::Output { id, .. } | BackendEvent::Exited { id, .. } => id,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<BackendEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<BackendEvent>;

/// Create the channel a backend host publishes its events on.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// A host for per-session backend channels.
///
/// Implementations must not block the caller waiting on the process: writes
/// are queued, and failures after the call returns are reported by logging
/// or by an [`BackendEvent::Exited`] event.
pub trait BackendHost: Send + Sync {
    /// Start a process for `id` at the given size.
    fn open(&self, id: &SessionId, size: Geometry) -> Result<(), MuxError>;

    /// Queue bytes for the process's input.
    fn write(&self, id: &SessionId, data: &[u8]) -> Result<(), MuxError>;

    fn resize(&self, id: &SessionId, size: Geometry) -> Result<(), MuxError>;

    /// Tear the channel down. Queued input may be lost.
    fn close(&self, id: &SessionId) -> Result<(), MuxError>;
}
