//! In-memory collaborators for exercising the multiplexer without a PTY.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::backend::BackendHost;
use crate::error::MuxError;
use crate::session::{Geometry, SessionId};
use crate::settings::Settings;
use crate::surface::{RenderSurface, SurfaceFactory, Viewport};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostCall {
    Open(SessionId, Geometry),
    Write(SessionId, Vec<u8>),
    Resize(SessionId, Geometry),
    Close(SessionId),
}

type OpenHook = Box<dyn Fn(&SessionId) + Send + Sync>;

/// Records every call. Sessions marked dead with [`FakeHost::kill`] fail
/// their operations with `BackendUnavailable`.
#[derive(Default)]
pub struct FakeHost {
    calls: Mutex<Vec<HostCall>>,
    dead: Mutex<HashSet<SessionId>>,
    before_open: Mutex<Option<OpenHook>>,
}

impl FakeHost {
    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn writes(&self, id: &SessionId) -> Vec<u8> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HostCall::Write(target, data) if &target == id => Some(data),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Run `hook` at the start of every `open`, before it is recorded.
    pub fn before_open(&self, hook: impl Fn(&SessionId) + Send + Sync + 'static) {
        *self.before_open.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn kill(&self, id: &SessionId) {
        self.dead.lock().unwrap().insert(id.clone());
    }

    fn record(&self, id: &SessionId, call: HostCall) -> Result<(), MuxError> {
        self.calls.lock().unwrap().push(call);
        if self.dead.lock().unwrap().contains(id) {
            return Err(MuxError::backend(id, "process is dead"));
        }
        Ok(())
    }
}

impl BackendHost for FakeHost {
    fn open(&self, id: &SessionId, size: Geometry) -> Result<(), MuxError> {
        if let Some(hook) = self.before_open.lock().unwrap().as_ref() {
            hook(id);
        }
        self.record(id, HostCall::Open(id.clone(), size))
    }

    fn write(&self, id: &SessionId, data: &[u8]) -> Result<(), MuxError> {
        self.record(id, HostCall::Write(id.clone(), data.to_vec()))
    }

    fn resize(&self, id: &SessionId, size: Geometry) -> Result<(), MuxError> {
        self.record(id, HostCall::Resize(id.clone(), size))
    }

    fn close(&self, id: &SessionId) -> Result<(), MuxError> {
        self.record(id, HostCall::Close(id.clone()))
    }
}

/// What a [`FakeSurface`] has been asked to do.
#[derive(Default)]
pub struct SurfaceLog {
    pub output: Vec<u8>,
    pub settings: Option<Settings>,
    pub exit: Option<Option<u32>>,
}

/// A surface that fits a fixed pixel viewport and records its inputs.
pub struct FakeSurface {
    viewport: Viewport,
    settings: Settings,
    log: Arc<Mutex<SurfaceLog>>,
}

impl RenderSurface for FakeSurface {
    fn write(&mut self, data: &[u8]) {
        self.log.lock().unwrap().output.extend_from_slice(data);
    }

    fn apply_settings(&mut self, settings: &Settings) {
        self.settings = settings.clone();
        self.log.lock().unwrap().settings = Some(settings.clone());
    }

    fn fit(&self) -> Option<Geometry> {
        Some(self.viewport.fit(&self.settings))
    }

    fn exited(&mut self, code: Option<u32>) {
        self.log.lock().unwrap().exit = Some(code);
    }
}

/// Builds [`FakeSurface`]s and keeps their logs by session.
pub struct FakeSurfaces {
    viewport: Viewport,
    logs: Mutex<Vec<(SessionId, Arc<Mutex<SurfaceLog>>)>>,
}

impl FakeSurfaces {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            logs: Mutex::new(Vec::new()),
        }
    }

    pub fn log(&self, id: &SessionId) -> Arc<Mutex<SurfaceLog>> {
        let logs = self.logs.lock().unwrap();
        let (_, log) = logs
            .iter()
            .rev()
            .find(|(target, _)| target == id)
            .expect("no surface for session");
        Arc::clone(log)
    }

    pub fn output(&self, id: &SessionId) -> Vec<u8> {
        self.log(id).lock().unwrap().output.clone()
    }
}

impl SurfaceFactory for FakeSurfaces {
    fn create(&self, id: &SessionId, settings: &Settings) -> Box<dyn RenderSurface> {
        let log = Arc::new(Mutex::new(SurfaceLog::default()));
        self.logs.lock().unwrap().push((id.clone(), Arc::clone(&log)));
        Box::new(FakeSurface {
            viewport: self.viewport,
            settings: settings.clone(),
            log,
        })
    }
}
