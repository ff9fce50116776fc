//! tabmux-core: session multiplexing for a tabbed terminal front-end.
//!
//! This crate sits between the tabs a user sees and the backend channels
//! that run their shells. It routes bytes both ways, manages the session
//! lifecycle, and picks submitted commands out of the keystroke stream for
//! history.
//!
//! # Architecture
//!
//! - [`codec`] — Turns keystrokes into completed command lines.
//! - [`SessionRegistry`] — Live sessions, their geometry, and which one has focus.
//! - [`ChannelRouter`] — One inbound subscription and one write path per session.
//! - [`MuxController`] — Ties the above together for the presentation layer.
//!
//! Collaborators are traits: [`BackendHost`] runs processes (see the
//! `tabmux-pty` crate), [`RenderSurface`] draws them, [`HistoryStore`]
//! records commands.

pub mod backend;
pub mod codec;
pub mod controller;
pub mod error;
pub mod history;
pub mod registry;
pub mod router;
pub mod session;
pub mod settings;
pub mod surface;

#[cfg(test)]
mod testing;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock, recovering the data from a poisoned mutex.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub use backend::{event_channel, BackendEvent, BackendHost, EventReceiver, EventSender};
pub use codec::{consume_byte, CompletedLine, LineBuffer};
pub use controller::MuxController;
pub use error::{MuxError, SettingsError};
pub use history::{group_by_day, HistoryEntry, HistoryGroup, HistoryStore, MemoryHistory};
pub use registry::SessionRegistry;
pub use router::{ChannelRouter, DataCallback, SubscriptionHandle};
pub use session::{Geometry, Lifecycle, Session, SessionId};
pub use settings::{CursorStyle, DeltaEffect, Settings, SettingsDelta, SettingsStore, Shell, Theme};
pub use surface::{RenderSurface, SurfaceFactory, Viewport};
