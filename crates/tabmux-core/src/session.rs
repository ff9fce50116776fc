use std::fmt;

use crate::codec::LineBuffer;
use crate::router::SubscriptionHandle;

/// Opaque, globally unique identifier for a terminal session.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Terminal grid size in character cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub rows: u16,
    pub cols: u16,
}

impl Geometry {
    pub const fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }

    pub fn is_valid(&self) -> bool {
        self.rows > 0 && self.cols > 0
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new(24, 80)
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// Where a session is in its life. Closed sessions have no record at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Registered, no inbound subscription yet.
    Created,
    /// Subscribed to its backend stream; `resize` and `send` are legal.
    Attached,
    /// Teardown in progress.
    Detaching,
}

/// Registry record for one live session.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    pub(crate) geometry: Geometry,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) line: LineBuffer,
    pub(crate) subscription: Option<SubscriptionHandle>,
    /// `Some(code)` once the backend reported the process gone.
    pub(crate) exited: Option<Option<u32>>,
}

impl Session {
    pub(crate) fn new(id: SessionId, geometry: Geometry) -> Self {
        Self {
            id,
            geometry,
            lifecycle: Lifecycle::Created,
            line: LineBuffer::new(),
            subscription: None,
            exited: None,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Input typed since the last command boundary.
    pub fn pending_input(&self) -> String {
        self.line.pending()
    }

    pub fn has_exited(&self) -> bool {
        self.exited.is_some()
    }

    pub fn exit_code(&self) -> Option<u32> {
        self.exited.flatten()
    }
}
