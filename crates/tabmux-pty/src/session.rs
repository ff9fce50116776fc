//! One running process and the two OS threads that service its PTY.
//!
//! PTY reads and writes block, so each session gets a dedicated reader
//! thread, publishing output as [`BackendEvent`]s, and a writer thread
//! draining a queue of input. Callers never wait on the process.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tabmux_core::{BackendEvent, EventSender, Geometry, SessionId};
use tokio::sync::mpsc;

use crate::config::PtyConfig;
use crate::pty::{try_wait, PtyError, PtyHandle, SharedChild};

/// How long the reader waits for an exit status after the PTY closes.
const EXIT_STATUS_GRACE: Duration = Duration::from_secs(2);

pub struct PtySession {
    handle: PtyHandle,
    input: mpsc::UnboundedSender<Vec<u8>>,
    /// Cleared when the process exits or the session is closed.
    alive: Arc<AtomicBool>,
}

impl PtySession {
    /// Spawn the process and start its I/O threads.
    pub fn start(
        id: SessionId,
        config: &PtyConfig,
        size: Geometry,
        events: EventSender,
    ) -> Result<Self, PtyError> {
        let mut handle = PtyHandle::spawn(config, size)?;
        let reader = handle
            .take_reader()
            .ok_or_else(|| PtyError::SpawnFailed("PTY reader already taken".into()))?;
        let writer = handle
            .take_writer()
            .ok_or_else(|| PtyError::SpawnFailed("PTY writer already taken".into()))?;

        let alive = Arc::new(AtomicBool::new(true));
        let (input, input_rx) = mpsc::unbounded_channel();

        start_reader_thread(id.clone(), reader, handle.child(), Arc::clone(&alive), events)?;
        start_writer_thread(id, writer, input_rx)?;

        Ok(Self {
            handle,
            input,
            alive,
        })
    }

    /// Queue input for the process.
    pub fn write(&self, data: &[u8]) -> Result<(), PtyError> {
        if !self.is_alive() {
            return Err(PtyError::ProcessExited);
        }
        self.input
            .send(data.to_vec())
            .map_err(|_| PtyError::ProcessExited)
    }

    pub fn resize(&self, size: Geometry) -> Result<(), PtyError> {
        if !self.is_alive() {
            return Err(PtyError::ProcessExited);
        }
        self.handle.resize(size)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        // Closed on purpose: the reader must not report an exit.
        self.alive.store(false, Ordering::Release);
    }
}

fn start_reader_thread(
    id: SessionId,
    reader: Box<dyn Read + Send>,
    child: SharedChild,
    alive: Arc<AtomicBool>,
    events: EventSender,
) -> Result<(), PtyError> {
    std::thread::Builder::new()
        .name(format!("pty-read-{id}"))
        .spawn(move || {
            read_loop(&id, reader, &events);

            // `swap` so that only an exit the host did not cause is reported.
            if alive.swap(false, Ordering::AcqRel) {
                let code = wait_for_exit(&child);
                log::info!("session {id} process exited with {code:?}");
                let _ = events.send(BackendEvent::Exited { id, code });
            }
        })
        .map(|_| ())
        .map_err(|e| {
            log::error!("failed to start PTY reader thread: {e}");
            PtyError::SpawnFailed(format!("failed to spawn reader thread: {e}"))
        })
}

fn read_loop(id: &SessionId, mut reader: Box<dyn Read + Send>, events: &EventSender) {
    let mut buf = [0u8; 65536];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return, // EOF: PTY closed
            Ok(n) => n,
            Err(e) => {
                log::debug!("PTY read for session {id} ended: {e}");
                return;
            }
        };
        let event = BackendEvent::Output {
            id: id.clone(),
            data: buf[..n].to_vec(),
        };
        if events.send(event).is_err() {
            return; // Nobody is listening any more.
        }
    }
}

/// The PTY closes slightly before the child is reaped; poll briefly.
fn wait_for_exit(child: &SharedChild) -> Option<u32> {
    let deadline = Instant::now() + EXIT_STATUS_GRACE;
    loop {
        if let Some(code) = try_wait(child) {
            return Some(code);
        }
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn start_writer_thread(
    id: SessionId,
    mut writer: Box<dyn Write + Send>,
    mut input: mpsc::UnboundedReceiver<Vec<u8>>,
) -> Result<(), PtyError> {
    std::thread::Builder::new()
        .name(format!("pty-write-{id}"))
        .spawn(move || {
            if let Err(e) = write_loop(&mut *writer, &mut input) {
                log::warn!("dropping input for session {id}: {e}");
            }
        })
        .map(|_| ())
        .map_err(|e| {
            log::error!("failed to start PTY writer thread: {e}");
            PtyError::SpawnFailed(format!("failed to spawn writer thread: {e}"))
        })
}

/// Copy queued input into the PTY until the queue closes.
fn write_loop(
    writer: &mut dyn Write,
    input: &mut mpsc::UnboundedReceiver<Vec<u8>>,
) -> Result<(), PtyError> {
    while let Some(data) = input.blocking_recv() {
        writer.write_all(&data)?;
        writer.flush()?;
    }
    Ok(())
}
