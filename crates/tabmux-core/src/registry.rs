//! The authoritative set of live sessions.
//!
//! Sessions are kept in creation order. That order drives focus fallback:
//! when the active session closes, focus moves to the most recently opened
//! session that is still alive.

use crate::codec::CompletedLine;
use crate::error::MuxError;
use crate::router::SubscriptionHandle;
use crate::session::{Geometry, Lifecycle, Session, SessionId};

pub struct SessionRegistry {
    sessions: Vec<Session>,
    active: Option<SessionId>,
    default_geometry: Geometry,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_default_geometry(Geometry::default())
    }

    /// Create a registry whose new sessions start at `geometry`.
    pub fn with_default_geometry(geometry: Geometry) -> Self {
        Self {
            sessions: Vec::new(),
            active: None,
            default_geometry: geometry,
        }
    }

    /// Register a new session and give it focus.
    ///
    /// Uses `desired` as the ID when given, otherwise generates one.
    pub fn open(&mut self, desired: Option<SessionId>) -> Result<SessionId, MuxError> {
        let id = match desired {
            Some(id) if self.contains(&id) => return Err(MuxError::DuplicateId(id)),
            Some(id) => id,
            None => SessionId::generate(),
        };
        self.sessions
            .push(Session::new(id.clone(), self.default_geometry));
        self.active = Some(id.clone());
        log::debug!("opened session {id}");
        Ok(id)
    }

    /// Remove a session. Focus falls back to the newest remaining session.
    pub fn close(&mut self, id: &SessionId) -> Result<(), MuxError> {
        let index = self
            .position(id)
            .ok_or_else(|| MuxError::UnknownSession(id.clone()))?;
        self.sessions.remove(index);

        if self.active.as_ref() == Some(id) {
            self.active = self.sessions.last().map(|s| s.id().clone());
            log::debug!("closed active session {id}, focus -> {:?}", self.active);
        } else {
            log::debug!("closed session {id}");
        }
        Ok(())
    }

    /// Update a session's geometry.
    ///
    /// Returns `true` if the geometry actually changed.
    pub fn resize(&mut self, id: &SessionId, rows: u16, cols: u16) -> Result<bool, MuxError> {
        let geometry = Geometry::new(rows, cols);
        if !geometry.is_valid() {
            return Err(MuxError::InvalidGeometry { rows, cols });
        }
        let session = self.get_mut(id)?;
        if session.geometry == geometry {
            return Ok(false);
        }
        session.geometry = geometry;
        Ok(true)
    }

    /// Move focus to `id`.
    pub fn set_active(&mut self, id: &SessionId) -> Result<(), MuxError> {
        if !self.contains(id) {
            return Err(MuxError::UnknownSession(id.clone()));
        }
        self.active = Some(id.clone());
        Ok(())
    }

    /// All session IDs in creation order.
    pub fn list_all(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|s| s.id().clone()).collect()
    }

    pub fn active(&self) -> Option<&SessionId> {
        self.active.as_ref()
    }

    pub fn is_active(&self, id: &SessionId) -> bool {
        self.active.as_ref() == Some(id)
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id() == id)
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Record the session's inbound subscription; it may now send and resize.
    pub(crate) fn mark_attached(
        &mut self,
        id: &SessionId,
        handle: SubscriptionHandle,
    ) -> Result<(), MuxError> {
        let session = self.get_mut(id)?;
        session.subscription = Some(handle);
        session.lifecycle = Lifecycle::Attached;
        Ok(())
    }

    /// Start tearing a session down, handing back its subscription.
    ///
    /// The line buffer is dropped here; nothing typed after this point
    /// reaches history.
    pub(crate) fn begin_detach(
        &mut self,
        id: &SessionId,
    ) -> Result<Option<SubscriptionHandle>, MuxError> {
        let session = self.get_mut(id)?;
        session.lifecycle = Lifecycle::Detaching;
        session.line.clear();
        Ok(session.subscription.take())
    }

    pub(crate) fn mark_exited(&mut self, id: &SessionId, code: Option<u32>) -> Result<(), MuxError> {
        self.get_mut(id)?.exited = Some(code);
        Ok(())
    }

    /// Run input through the session's line buffer.
    ///
    /// Only attached sessions accept input.
    pub(crate) fn feed_input(
        &mut self,
        id: &SessionId,
        data: &[u8],
    ) -> Result<Vec<CompletedLine>, MuxError> {
        let session = self.get_mut(id)?;
        if session.lifecycle != Lifecycle::Attached {
            return Err(MuxError::UnknownSession(id.clone()));
        }
        Ok(session.line.feed(data))
    }

    fn get_mut(&mut self, id: &SessionId) -> Result<&mut Session, MuxError> {
        self.sessions
            .iter_mut()
            .find(|s| s.id() == id)
            .ok_or_else(|| MuxError::UnknownSession(id.clone()))
    }

    fn position(&self, id: &SessionId) -> Option<usize> {
        self.sessions.iter().position(|s| s.id() == id)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
