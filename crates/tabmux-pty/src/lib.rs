//! tabmux-pty: the PTY process host behind tabmux sessions.
//!
//! Implements [`tabmux_core::BackendHost`] with `portable-pty`. Each session
//! is a real shell process on its own pseudo-terminal, serviced by a reader
//! and a writer thread so the multiplexer never blocks on it.
//!
//! # Architecture
//!
//! - [`PtyHandle`] — Low-level PTY process management (spawn, resize, exit status).
//! - [`PtySession`] — A `PtyHandle` plus the threads that move its bytes.
//! - [`PtyHost`] — Sessions keyed by [`tabmux_core::SessionId`].

pub mod config;
pub mod host;
pub mod pty;
pub mod session;

pub use config::{default_shell, PtyConfig};
pub use host::PtyHost;
pub use pty::{PtyError, PtyHandle};
pub use session::PtySession;
