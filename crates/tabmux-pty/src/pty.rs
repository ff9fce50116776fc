use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tabmux_core::Geometry;

use crate::config::PtyConfig;

/// Errors from PTY operations.
#[derive(Debug)]
pub enum PtyError {
    SpawnFailed(String),
    IoError(std::io::Error),
    ResizeFailed(String),
    /// The process is gone; its PTY no longer accepts input.
    ProcessExited,
}

impl std::fmt::Display for PtyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PtyError::SpawnFailed(msg) => write!(f, "PTY spawn failed: {msg}"),
            PtyError::IoError(err) => write!(f, "PTY I/O error: {err}"),
            PtyError::ResizeFailed(msg) => write!(f, "PTY resize failed: {msg}"),
            PtyError::ProcessExited => write!(f, "PTY process has exited"),
        }
    }
}

impl std::error::Error for PtyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PtyError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PtyError {
    fn from(err: std::io::Error) -> Self {
        PtyError::IoError(err)
    }
}

pub(crate) type SharedChild = Arc<Mutex<Box<dyn Child + Send + Sync>>>;

fn pty_size(size: Geometry) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Owns a portable-pty child process and the master side of its PTY.
///
/// The reader and writer are handed out once so they can be serviced on
/// their own threads. Dropping the handle kills the child if it is still
/// running.
pub struct PtyHandle {
    master: Box<dyn MasterPty + Send>,
    reader: Option<Box<dyn Read + Send>>,
    writer: Option<Box<dyn Write + Send>>,
    child: SharedChild,
}

impl PtyHandle {
    /// Spawn the configured program on a new PTY of the given size.
    pub fn spawn(config: &PtyConfig, size: Geometry) -> Result<Self, PtyError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(pty_size(size))
            .map_err(|e| PtyError::SpawnFailed(format!("failed to open PTY: {e}")))?;

        let program = config.program();
        let mut cmd = CommandBuilder::new(&program);
        for arg in &config.args {
            cmd.arg(arg);
        }
        if let Some(dir) = &config.working_dir {
            cmd.cwd(dir);
        }
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::SpawnFailed(format!("failed to spawn {program}: {e}")))?;
        log::info!("spawned {program} with PID {:?}", child.process_id());

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to clone reader: {e}")))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to take writer: {e}")))?;

        Ok(Self {
            master: pair.master,
            reader: Some(reader),
            writer: Some(writer),
            child: Arc::new(Mutex::new(child)),
        })
    }

    /// Resize the PTY to new dimensions.
    pub fn resize(&self, size: Geometry) -> Result<(), PtyError> {
        self.master
            .resize(pty_size(size))
            .map_err(|e| PtyError::ResizeFailed(format!("{e}")))
    }

    /// Take the output side (shell -> us). Blocking; read it on its own thread.
    pub fn take_reader(&mut self) -> Option<Box<dyn Read + Send>> {
        self.reader.take()
    }

    /// Take the input side (us -> shell).
    pub fn take_writer(&mut self) -> Option<Box<dyn Write + Send>> {
        self.writer.take()
    }

    pub(crate) fn child(&self) -> SharedChild {
        Arc::clone(&self.child)
    }

    /// Get the child process exit status if it has exited.
    ///
    /// Returns `None` if the process is still running.
    pub fn try_wait(&self) -> Option<u32> {
        try_wait(&self.child)
    }

    pub fn is_alive(&self) -> bool {
        self.try_wait().is_none()
    }

    pub fn process_id(&self) -> Option<u32> {
        self.child.lock().ok().and_then(|child| child.process_id())
    }
}

pub(crate) fn try_wait(child: &SharedChild) -> Option<u32> {
    let mut child = child.lock().ok()?;
    match child.try_wait() {
        Ok(Some(status)) => Some(status.exit_code()),
        _ => None,
    }
}

impl Drop for PtyHandle {
    fn drop(&mut self) {
        if let Ok(mut child) = self.child.lock() {
            if let Ok(None) = child.try_wait() {
                if let Err(e) = child.kill() {
                    log::warn!("failed to kill PTY child: {e}");
                }
            }
        }
    }
}
