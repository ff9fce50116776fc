//! The public session lifecycle contract for the presentation layer.
//!
//! `MuxController` owns the session registry and the channel router. The
//! presentation layer only ever holds [`SessionId`]s and goes through the
//! controller for every change.
//!
//! Backend calls are fire-and-forget: `send`, `resize` and `close` failures
//! are logged and the session stays in place. Only caller misuse
//! (`DuplicateId`, `InvalidGeometry`, focusing an unknown tab) is returned
//! as an error.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::backend::{BackendEvent, BackendHost, EventReceiver};
use crate::codec::CompletedLine;
use crate::error::MuxError;
use crate::history::{HistoryEntry, HistoryStore, MemoryHistory};
use crate::lock;
use crate::registry::SessionRegistry;
use crate::router::ChannelRouter;
use crate::session::{Geometry, Lifecycle, SessionId};
use crate::settings::{DeltaEffect, Settings, SettingsDelta, SettingsStore};
use crate::surface::{RenderSurface, SurfaceFactory};

type SharedSurface = Arc<Mutex<Box<dyn RenderSurface>>>;

pub struct MuxController {
    registry: Mutex<SessionRegistry>,
    router: ChannelRouter,
    host: Arc<dyn BackendHost>,
    factory: Arc<dyn SurfaceFactory>,
    surfaces: Mutex<HashMap<SessionId, SharedSurface>>,
    settings: SettingsStore,
    history: Arc<dyn HistoryStore>,
}

impl MuxController {
    pub fn new(host: Arc<dyn BackendHost>, factory: Arc<dyn SurfaceFactory>) -> Self {
        let settings = Settings::default();
        Self {
            registry: Mutex::new(SessionRegistry::new()),
            router: ChannelRouter::new(Arc::clone(&host)),
            host,
            factory,
            surfaces: Mutex::new(HashMap::new()),
            history: Arc::new(MemoryHistory::new(settings.history_limit)),
            settings: SettingsStore::new(settings),
        }
    }

    /// Start from previously saved settings.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.history.set_limit(settings.history_limit);
        self.settings = SettingsStore::new(settings);
        self
    }

    /// Record history somewhere other than the default in-memory store.
    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        history.set_limit(self.settings.current().history_limit);
        self.history = history;
        self
    }

    /// Geometry for sessions whose surface cannot fit itself yet.
    pub fn with_default_geometry(self, geometry: Geometry) -> Self {
        *lock(&self.registry) = SessionRegistry::with_default_geometry(geometry);
        self
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Open a new tab with a generated ID. It becomes the active tab.
    pub fn create_tab(&self) -> Result<SessionId, MuxError> {
        self.create_tab_with_id(None)
    }

    /// Open a new tab, using `desired` as its ID if given.
    ///
    /// A backend that fails to start is logged; the tab stays open but inert.
    pub fn create_tab_with_id(&self, desired: Option<SessionId>) -> Result<SessionId, MuxError> {
        let settings = self.settings.current();
        let id = lock(&self.registry).open(desired)?;

        let surface = self.factory.create(&id, &settings);
        let fitted = surface.fit().filter(Geometry::is_valid);
        let geometry = {
            let mut registry = lock(&self.registry);
            if let Some(size) = fitted {
                registry.resize(&id, size.rows, size.cols)?;
            }
            registry
                .get(&id)
                .map(|s| s.geometry())
                .ok_or_else(|| MuxError::UnknownSession(id.clone()))?
        };

        let surface: SharedSurface = Arc::new(Mutex::new(surface));
        let sink = Arc::clone(&surface);
        let handle = self.router.attach(
            &id,
            Box::new(move |data: &[u8]| lock(&*sink).write(data)),
        );
        lock(&self.surfaces).insert(id.clone(), surface);

        // The tab may have been closed from another thread since `open`.
        if let Err(e) = lock(&self.registry).mark_attached(&id, handle.clone()) {
            self.router.detach(&handle);
            lock(&self.surfaces).remove(&id);
            return Err(e);
        }

        // Attach before open so no early output is missed.
        match self.host.open(&id, geometry) {
            Ok(()) => {
                // A close that began before the process existed could not stop it.
                let attached = lock(&self.registry)
                    .get(&id)
                    .is_some_and(|s| s.lifecycle() == Lifecycle::Attached);
                if !attached {
                    log::debug!("tab {id} closed while its backend was starting");
                    if let Err(e) = self.host.close(&id) {
                        log::warn!("closing backend for tab {id}: {e}");
                    }
                    return Err(MuxError::UnknownSession(id));
                }
            }
            Err(e) => log::warn!("tab {id} has no backend: {e}"),
        }

        log::debug!("created tab {id} at {geometry}");
        Ok(id)
    }

    /// Close a tab. Closing an unknown or already-closed tab does nothing.
    ///
    /// Output still in flight is discarded, and queued input may never
    /// reach the process.
    pub fn close_tab(&self, id: &SessionId) {
        let handle = match lock(&self.registry).begin_detach(id) {
            Ok(handle) => handle,
            Err(_) => {
                log::debug!("close of unknown tab {id} ignored");
                return;
            }
        };

        if let Some(handle) = handle {
            self.router.detach(&handle);
        }
        if let Err(e) = self.host.close(id) {
            log::warn!("closing backend for tab {id}: {e}");
        }
        lock(&self.surfaces).remove(id);

        let mut registry = lock(&self.registry);
        if registry.close(id).is_ok() {
            log::debug!("closed tab {id}, active: {:?}", registry.active());
        }
    }

    /// Focus a tab. Background tabs keep running.
    pub fn switch_tab(&self, id: &SessionId) -> Result<(), MuxError> {
        lock(&self.registry).set_active(id)?;
        log::debug!("switched to tab {id}");
        Ok(())
    }

    pub fn active_tab(&self) -> Option<SessionId> {
        lock(&self.registry).active().cloned()
    }

    /// Open tabs in creation order.
    pub fn tabs(&self) -> Vec<SessionId> {
        lock(&self.registry).list_all()
    }

    pub fn geometry(&self, id: &SessionId) -> Option<Geometry> {
        lock(&self.registry).get(id).map(|s| s.geometry())
    }

    /// The process behind the tab has exited.
    pub fn has_exited(&self, id: &SessionId) -> bool {
        lock(&self.registry)
            .get(id)
            .is_some_and(|s| s.has_exited())
    }

    /// Resize a tab's grid and its backend.
    ///
    /// Repeating the current size is a no-op.
    pub fn resize(&self, id: &SessionId, rows: u16, cols: u16) -> Result<(), MuxError> {
        let changed = {
            let mut registry = lock(&self.registry);
            let attached = registry
                .get(id)
                .is_some_and(|s| s.lifecycle() == Lifecycle::Attached);
            if !attached {
                return Err(MuxError::UnknownSession(id.clone()));
            }
            registry.resize(id, rows, cols)?
        };

        if changed {
            if let Err(e) = self.host.resize(id, Geometry::new(rows, cols)) {
                log::warn!("resizing backend for tab {id}: {e}");
            }
        }
        Ok(())
    }

    /// Keystrokes from a tab's surface.
    ///
    /// Completed command lines go to history; the bytes go to the backend.
    /// Input for a closed tab is dropped.
    pub fn handle_input(&self, id: &SessionId, data: &[u8]) {
        let lines = match lock(&self.registry).feed_input(id, data) {
            Ok(lines) => lines,
            Err(e) => {
                log::warn!("dropping {} input bytes: {e}", data.len());
                return;
            }
        };
        self.record_history(lines);

        if let Err(e) = self.router.send(id, data) {
            log::warn!("dropping {} input bytes: {e}", data.len());
        }
    }

    /// Type `text` into a tab as if the user had entered it.
    ///
    /// Falls back to the active tab when `id` is not a live tab, and does
    /// nothing when there is no tab at all.
    pub fn insert_text(&self, id: Option<&SessionId>, text: &str) {
        let target = {
            let registry = lock(&self.registry);
            match id {
                Some(id)
                    if registry
                        .get(id)
                        .is_some_and(|s| s.lifecycle() == Lifecycle::Attached) =>
                {
                    Some(id.clone())
                }
                _ => registry.active().cloned(),
            }
        };

        match target {
            Some(target) => self.handle_input(&target, text.as_bytes()),
            None => log::debug!("no tab to insert text into"),
        }
    }

    /// Change settings and push them to every tab's surface.
    ///
    /// Backend connections are untouched, except that tabs whose grid no
    /// longer fits are resized.
    pub fn apply_settings_change(&self, delta: SettingsDelta) -> DeltaEffect {
        let effect = self.settings.update(delta);
        if effect.changed {
            self.broadcast_settings();
        }
        effect
    }

    /// Push the current settings to every surface and re-fit the grids.
    pub fn broadcast_settings(&self) {
        let settings = self.settings.current();
        self.history.set_limit(settings.history_limit);

        let surfaces: Vec<(SessionId, SharedSurface)> = lock(&self.surfaces)
            .iter()
            .map(|(id, surface)| (id.clone(), Arc::clone(surface)))
            .collect();

        for (id, surface) in surfaces {
            let fitted = {
                let mut surface = lock(&*surface);
                surface.apply_settings(&settings);
                surface.fit()
            };
            if let Some(size) = fitted {
                if let Err(e) = self.resize(&id, size.rows, size.cols) {
                    log::warn!("re-fitting tab {id}: {e}");
                }
            }
        }
    }

    /// Route one backend event.
    pub fn dispatch(&self, event: BackendEvent) {
        match event {
            BackendEvent::Output { id, data } => {
                self.router.deliver(&id, &data);
            }
            BackendEvent::Exited { id, code } => self.handle_exit(&id, code),
        }
    }

    /// Dispatch every event already queued, without waiting.
    pub fn drain(&self, events: &mut EventReceiver) -> usize {
        let mut count = 0;
        while let Ok(event) = events.try_recv() {
            self.dispatch(event);
            count += 1;
        }
        count
    }

    /// Event loop: dispatch backend events and react to settings changes
    /// made through the store. Returns once the backend channel closes.
    pub async fn run(&self, mut events: EventReceiver) {
        let mut settings_rx = self.settings.subscribe();
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
                Ok(()) = settings_rx.changed() => self.broadcast_settings(),
            }
        }
        log::debug!("backend event stream closed");
    }

    fn handle_exit(&self, id: &SessionId, code: Option<u32>) {
        if lock(&self.registry).mark_exited(id, code).is_err() {
            log::trace!("exit for closed tab {id}");
            return;
        }
        log::info!("tab {id} process exited with {code:?}");

        let surface = lock(&self.surfaces).get(id).cloned();
        if let Some(surface) = surface {
            lock(&*surface).exited(code);
        }

        if self.settings.current().close_on_exit {
            self.close_tab(id);
        }
    }

    fn record_history(&self, lines: Vec<CompletedLine>) {
        if lines.is_empty() || !self.settings.current().auto_save_history {
            return;
        }
        for line in lines {
            if let Some(entry) = HistoryEntry::new(line.as_str()) {
                self.history.append(entry);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::event_channel;
    use crate::testing::{FakeHost, FakeSurfaces, HostCall};
    use crate::surface::Viewport;

    /// 840x480 px at the default 14px / 1.5 font: 8.4px x 21px cells.
    const VIEWPORT: Viewport = Viewport {
        width: 840.0,
        height: 480.0,
    };

    fn setup() -> (Arc<FakeHost>, Arc<FakeSurfaces>, MuxController) {
        let host = Arc::new(FakeHost::default());
        let surfaces = Arc::new(FakeSurfaces::new(VIEWPORT));
        let mux = MuxController::new(host.clone(), surfaces.clone());
        (host, surfaces, mux)
    }

    fn output(id: &SessionId, data: &[u8]) -> BackendEvent {
        BackendEvent::Output {
            id: id.clone(),
            data: data.to_vec(),
        }
    }

    #[test]
    fn test_create_tab_opens_backend_at_fitted_size() {
        let (host, _, mux) = setup();
        let id = mux.create_tab().unwrap();

        let expected = VIEWPORT.fit(&Settings::default());
        assert_eq!(mux.geometry(&id), Some(expected));
        assert_eq!(host.calls(), vec![HostCall::Open(id.clone(), expected)]);
        assert_eq!(mux.active_tab(), Some(id));
    }

    #[test]
    fn test_create_tab_duplicate_id() {
        let (_, _, mux) = setup();
        mux.create_tab_with_id(Some("a".into())).unwrap();
        assert_eq!(
            mux.create_tab_with_id(Some("a".into())),
            Err(MuxError::DuplicateId("a".into()))
        );
        assert_eq!(mux.tabs().len(), 1);
    }

    #[test]
    fn test_single_focus_across_create_and_close() {
        let (_, _, mux) = setup();
        let a = mux.create_tab().unwrap();
        let b = mux.create_tab().unwrap();
        let c = mux.create_tab().unwrap();
        assert_eq!(mux.active_tab(), Some(c.clone()));

        mux.close_tab(&c);
        assert_eq!(mux.active_tab(), Some(b.clone()));
        mux.close_tab(&a);
        assert_eq!(mux.active_tab(), Some(b.clone()));
        mux.close_tab(&b);
        assert_eq!(mux.active_tab(), None);
        assert!(mux.tabs().is_empty());
    }

    #[test]
    fn test_concurrent_create_and_close_keep_single_focus() {
        let host = Arc::new(FakeHost::default());
        let surfaces = Arc::new(FakeSurfaces::new(VIEWPORT));
        let mux = Arc::new(MuxController::new(host.clone(), surfaces));

        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let mux = Arc::clone(&mux);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let id = SessionId::from(format!("w{worker}-{i}"));
                        mux.create_tab_with_id(Some(id.clone())).unwrap();
                        mux.handle_input(&id, b"ls\r");
                        if i % 2 == 1 {
                            mux.close_tab(&id);
                        }
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let tabs = mux.tabs();
        assert_eq!(tabs.len(), 100);
        let active = mux.active_tab().expect("a tab has focus");
        assert!(tabs.contains(&active));
        let closes = host
            .calls()
            .into_iter()
            .filter(|call| matches!(call, HostCall::Close(_)))
            .count();
        assert_eq!(closes, 100);

        let closers: Vec<_> = tabs
            .chunks(25)
            .map(|chunk| {
                let mux = Arc::clone(&mux);
                let chunk = chunk.to_vec();
                std::thread::spawn(move || {
                    for id in &chunk {
                        mux.close_tab(id);
                    }
                })
            })
            .collect();
        for closer in closers {
            closer.join().unwrap();
        }
        assert!(mux.tabs().is_empty());
        assert_eq!(mux.active_tab(), None);
    }

    #[test]
    fn test_tab_closed_while_backend_opens() {
        let host = Arc::new(FakeHost::default());
        let surfaces = Arc::new(FakeSurfaces::new(VIEWPORT));
        let mux = Arc::new(MuxController::new(host.clone(), surfaces));
        let weak = Arc::downgrade(&mux);
        host.before_open(move |id| {
            if let Some(mux) = weak.upgrade() {
                mux.close_tab(id);
            }
        });

        let id = SessionId::from("a");
        assert_eq!(
            mux.create_tab_with_id(Some(id.clone())),
            Err(MuxError::UnknownSession(id.clone()))
        );
        assert!(mux.tabs().is_empty());
        assert_eq!(mux.active_tab(), None);
        // The process started after the close must still be torn down.
        assert!(matches!(
            host.calls().as_slice(),
            [HostCall::Close(_), HostCall::Open(..), HostCall::Close(last)] if last == &id
        ));
    }

    #[test]
    fn test_close_tab_tears_down_backend() {
        let (host, surfaces, mux) = setup();
        let id = mux.create_tab().unwrap();
        mux.close_tab(&id);

        assert!(host.calls().contains(&HostCall::Close(id.clone())));
        // Output arriving after close never reaches the old surface.
        mux.dispatch(output(&id, b"late"));
        assert!(surfaces.output(&id).is_empty());
    }

    #[test]
    fn test_close_unknown_tab_is_noop() {
        let (host, _, mux) = setup();
        mux.close_tab(&"nope".into());
        assert!(host.calls().is_empty());
    }

    #[test]
    fn test_switch_tab() {
        let (_, _, mux) = setup();
        let a = mux.create_tab().unwrap();
        mux.create_tab().unwrap();
        mux.switch_tab(&a).unwrap();
        assert_eq!(mux.active_tab(), Some(a));
        assert_eq!(
            mux.switch_tab(&"nope".into()),
            Err(MuxError::UnknownSession("nope".into()))
        );
    }

    #[test]
    fn test_background_tabs_keep_receiving_output() {
        let (_, surfaces, mux) = setup();
        let a = mux.create_tab().unwrap();
        let b = mux.create_tab().unwrap();

        mux.dispatch(output(&a, b"background"));
        mux.dispatch(output(&b, b"foreground"));
        assert_eq!(surfaces.output(&a), b"background");
        assert_eq!(surfaces.output(&b), b"foreground");
    }

    #[test]
    fn test_resize_validation() {
        let (host, _, mux) = setup();
        let id = mux.create_tab().unwrap();

        assert_eq!(
            mux.resize(&id, 0, 80),
            Err(MuxError::InvalidGeometry { rows: 0, cols: 80 })
        );
        assert_eq!(
            mux.resize(&id, 24, 0),
            Err(MuxError::InvalidGeometry { rows: 24, cols: 0 })
        );
        mux.resize(&id, 24, 80).unwrap();
        mux.resize(&id, 24, 80).unwrap();

        let resizes = host
            .calls()
            .into_iter()
            .filter(|c| matches!(c, HostCall::Resize(..)))
            .count();
        assert_eq!(resizes, 1);
        assert_eq!(mux.geometry(&id), Some(Geometry::new(24, 80)));
    }

    #[test]
    fn test_resize_closed_tab() {
        let (_, _, mux) = setup();
        let id = mux.create_tab().unwrap();
        mux.close_tab(&id);
        assert_eq!(
            mux.resize(&id, 24, 80),
            Err(MuxError::UnknownSession(id))
        );
    }

    #[test]
    fn test_resize_dead_backend_keeps_tab() {
        let (host, _, mux) = setup();
        let id = mux.create_tab().unwrap();
        host.kill(&id);

        mux.resize(&id, 30, 100).unwrap();
        assert_eq!(mux.tabs(), vec![id.clone()]);
        assert_eq!(mux.geometry(&id), Some(Geometry::new(30, 100)));
    }

    #[test]
    fn test_input_records_history_and_forwards() {
        let (host, _, mux) = setup();
        let id = mux.create_tab().unwrap();

        for byte in b"hello\r" {
            mux.handle_input(&id, &[*byte]);
        }
        assert_eq!(host.writes(&id), b"hello\r");

        let history = mux.history().list();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].command, "hello");
        assert!(!history[0].pinned);
    }

    #[test]
    fn test_input_empty_lines_not_recorded() {
        let (_, _, mux) = setup();
        let id = mux.create_tab().unwrap();
        mux.handle_input(&id, b"\r");
        mux.handle_input(&id, &[b'h', b'i', 0x7f, 0x7f, b'\r']);
        assert!(mux.history().list().is_empty());
    }

    #[test]
    fn test_line_buffers_are_per_session() {
        let (_, _, mux) = setup();
        let a = mux.create_tab().unwrap();
        let b = mux.create_tab().unwrap();
        mux.handle_input(&a, b"git ");
        mux.handle_input(&b, b"ls\r");
        mux.handle_input(&a, b"log\r");

        let commands: Vec<_> = mux.history().list().into_iter().map(|e| e.command).collect();
        assert_eq!(commands, vec!["git log", "ls"]);
    }

    #[test]
    fn test_history_disabled_by_settings() {
        let (host, _, mux) = setup();
        mux.apply_settings_change(SettingsDelta {
            auto_save_history: Some(false),
            ..Default::default()
        });
        let id = mux.create_tab().unwrap();
        mux.handle_input(&id, b"secret\r");
        assert!(mux.history().list().is_empty());
        assert_eq!(host.writes(&id), b"secret\r");
    }

    #[test]
    fn test_input_to_dead_backend_is_dropped() {
        let (host, _, mux) = setup();
        let id = mux.create_tab().unwrap();
        host.kill(&id);
        mux.handle_input(&id, b"ls\r");
        assert_eq!(mux.tabs(), vec![id]);
    }

    #[test]
    fn test_input_to_closed_tab_is_dropped() {
        let (host, _, mux) = setup();
        let id = mux.create_tab().unwrap();
        mux.close_tab(&id);
        mux.handle_input(&id, b"ls\r");
        assert!(host.writes(&id).is_empty());
        assert!(mux.history().list().is_empty());
    }

    #[test]
    fn test_insert_text_without_tabs_is_noop() {
        let (host, _, mux) = setup();
        mux.insert_text(None, "ls -la");
        mux.insert_text(Some(&"ghost".into()), "ls -la");
        assert!(host.calls().is_empty());
    }

    #[test]
    fn test_insert_text_targets_named_tab() {
        let (host, _, mux) = setup();
        let a = mux.create_tab().unwrap();
        let b = mux.create_tab().unwrap();
        mux.insert_text(Some(&a), "make");
        assert_eq!(host.writes(&a), b"make");
        assert!(host.writes(&b).is_empty());
    }

    #[test]
    fn test_insert_text_falls_back_to_active_tab() {
        let (host, _, mux) = setup();
        let a = mux.create_tab().unwrap();
        let b = mux.create_tab().unwrap();
        mux.close_tab(&b);
        mux.insert_text(Some(&b), "pwd");
        assert_eq!(host.writes(&a), b"pwd");
    }

    #[test]
    fn test_settings_broadcast_refits_all_tabs() {
        let (host, surfaces, mux) = setup();
        let a = mux.create_tab().unwrap();
        let b = mux.create_tab().unwrap();
        let before = mux.geometry(&a).unwrap();

        let effect = mux.apply_settings_change(SettingsDelta {
            font_size: Some(28),
            ..Default::default()
        });
        assert!(effect.refit);

        let settings = mux.settings().current();
        let expected = VIEWPORT.fit(&settings);
        assert_ne!(before, expected);
        for id in [&a, &b] {
            assert_eq!(mux.geometry(id), Some(expected));
            assert!(host.calls().contains(&HostCall::Resize(id.clone(), expected)));
            let log = surfaces.log(id);
            assert_eq!(log.lock().unwrap().settings.as_ref(), Some(&settings));
        }
        // No backend reconnects.
        let opens = host
            .calls()
            .into_iter()
            .filter(|c| matches!(c, HostCall::Open(..) | HostCall::Close(..)))
            .count();
        assert_eq!(opens, 2);
    }

    #[test]
    fn test_theme_change_does_not_resize() {
        let (host, surfaces, mux) = setup();
        let id = mux.create_tab().unwrap();
        mux.apply_settings_change(SettingsDelta {
            theme: Some(crate::settings::Theme::MinimalPro),
            ..Default::default()
        });
        assert!(surfaces.log(&id).lock().unwrap().settings.is_some());
        assert!(!host.calls().iter().any(|c| matches!(c, HostCall::Resize(..))));
    }

    #[test]
    fn test_exit_keeps_tab_by_default() {
        let (_, surfaces, mux) = setup();
        let id = mux.create_tab().unwrap();
        mux.dispatch(BackendEvent::Exited {
            id: id.clone(),
            code: Some(0),
        });
        assert!(mux.has_exited(&id));
        assert_eq!(mux.tabs(), vec![id.clone()]);
        assert_eq!(surfaces.log(&id).lock().unwrap().exit, Some(Some(0)));
    }

    #[test]
    fn test_exit_closes_tab_when_configured() {
        let (_, _, mux) = setup();
        mux.apply_settings_change(SettingsDelta {
            close_on_exit: Some(true),
            ..Default::default()
        });
        let a = mux.create_tab().unwrap();
        let b = mux.create_tab().unwrap();
        mux.dispatch(BackendEvent::Exited {
            id: b.clone(),
            code: None,
        });
        assert_eq!(mux.tabs(), vec![a.clone()]);
        assert_eq!(mux.active_tab(), Some(a));
    }

    #[test]
    fn test_drain_dispatches_queued_events() {
        let (_, surfaces, mux) = setup();
        let id = mux.create_tab().unwrap();
        let (tx, mut rx) = event_channel();
        tx.send(output(&id, b"a")).unwrap();
        tx.send(output(&id, b"b")).unwrap();
        tx.send(output(&"other".into(), b"c")).unwrap();

        assert_eq!(mux.drain(&mut rx), 3);
        assert_eq!(surfaces.output(&id), b"ab");
    }

    #[tokio::test]
    async fn test_run_until_backend_closes() {
        let (_, surfaces, mux) = setup();
        let id = mux.create_tab().unwrap();
        let (tx, rx) = event_channel();
        tx.send(output(&id, b"prompt$ ")).unwrap();
        drop(tx);

        mux.run(rx).await;
        assert_eq!(surfaces.output(&id), b"prompt$ ");
    }

    #[tokio::test]
    async fn test_run_reacts_to_store_changes() {
        let host = Arc::new(FakeHost::default());
        let surfaces = Arc::new(FakeSurfaces::new(VIEWPORT));
        let mux = Arc::new(MuxController::new(host.clone(), surfaces.clone()));
        let id = mux.create_tab().unwrap();
        let (tx, rx) = event_channel();

        let runner = {
            let mux = Arc::clone(&mux);
            tokio::spawn(async move { mux.run(rx).await })
        };
        tokio::task::yield_now().await;

        // An import bypasses apply_settings_change; the loop picks it up.
        mux.settings().import_json(r#"{"fontSize": 20}"#).unwrap();
        let expected = VIEWPORT.fit(&mux.settings().current());

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
        while mux.geometry(&id) != Some(expected) && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(mux.geometry(&id), Some(expected));

        drop(tx);
        runner.await.unwrap();
    }
}
