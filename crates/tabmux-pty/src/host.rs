use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tabmux_core::{BackendHost, EventSender, Geometry, MuxError, SessionId};

use crate::config::PtyConfig;
use crate::session::PtySession;

/// Runs one PTY process per session and publishes their output.
///
/// Output and exit notifications go to the [`EventSender`] given at
/// construction; pair it with the receiver the multiplexer's event loop
/// drains.
pub struct PtyHost {
    config: Mutex<PtyConfig>,
    sessions: Mutex<HashMap<SessionId, PtySession>>,
    events: EventSender,
}

impl PtyHost {
    pub fn new(config: PtyConfig, events: EventSender) -> Self {
        Self {
            config: Mutex::new(config),
            sessions: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Change what new sessions launch. Running sessions are unaffected.
    pub fn set_config(&self, config: PtyConfig) {
        *lock(&self.config) = config;
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        lock(&self.sessions).contains_key(id)
    }

    /// List all session IDs.
    pub fn list_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = lock(&self.sessions).keys().cloned().collect();
        ids.sort();
        ids
    }

    fn with_session<T>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&PtySession) -> Result<T, crate::PtyError>,
    ) -> Result<T, MuxError> {
        let sessions = lock(&self.sessions);
        let session = sessions
            .get(id)
            .ok_or_else(|| MuxError::UnknownSession(id.clone()))?;
        f(session).map_err(|e| MuxError::backend(id, e.to_string()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BackendHost for PtyHost {
    fn open(&self, id: &SessionId, size: Geometry) -> Result<(), MuxError> {
        if self.contains(id) {
            return Err(MuxError::DuplicateId(id.clone()));
        }

        // Spawn without holding the session map.
        let config = lock(&self.config).clone();
        let session = PtySession::start(id.clone(), &config, size, self.events.clone())
            .map_err(|e| MuxError::backend(id, e.to_string()))?;

        let mut sessions = lock(&self.sessions);
        if sessions.contains_key(id) {
            // Lost a race with another open; the new process dies with `session`.
            return Err(MuxError::DuplicateId(id.clone()));
        }
        sessions.insert(id.clone(), session);
        log::debug!("PTY session {id} opened at {size}");
        Ok(())
    }

    fn write(&self, id: &SessionId, data: &[u8]) -> Result<(), MuxError> {
        self.with_session(id, |session| session.write(data))
    }

    fn resize(&self, id: &SessionId, size: Geometry) -> Result<(), MuxError> {
        self.with_session(id, |session| session.resize(size))
    }

    fn close(&self, id: &SessionId) -> Result<(), MuxError> {
        let session = lock(&self.sessions)
            .remove(id)
            .ok_or_else(|| MuxError::UnknownSession(id.clone()))?;
        // Dropping the session kills the process; do it outside the lock.
        drop(session);
        log::debug!("PTY session {id} closed");
        Ok(())
    }
}
