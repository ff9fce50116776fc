//! Binds each session to one inbound listener and one outbound write path.
//!
//! A session has at most one subscription. Attaching again replaces the old
//! listener instead of stacking a second one, so bytes are never delivered
//! twice to the same surface. Once [`ChannelRouter::detach`] returns, the
//! detached callback is never invoked again, even for events already in
//! flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};

use crate::backend::BackendHost;
use crate::error::MuxError;
use crate::lock;
use crate::session::SessionId;

/// Callback receiving a session's output bytes.
pub type DataCallback = Box<dyn FnMut(&[u8]) + Send>;

/// Identifies one particular subscription to a session's stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: SessionId,
    serial: u64,
}

impl SubscriptionHandle {
    pub fn session(&self) -> &SessionId {
        &self.id
    }
}

#[derive(Default)]
struct DeliveryState {
    /// Lent out while a delivery runs; gone for good once cancelled.
    on_data: Option<DataCallback>,
    cancelled: bool,
    /// Thread currently running the callback.
    running: Option<ThreadId>,
}

struct Subscriber {
    serial: u64,
    state: Mutex<DeliveryState>,
    idle: Condvar,
}

impl Subscriber {
    fn new(serial: u64, on_data: DataCallback) -> Self {
        Self {
            serial,
            state: Mutex::new(DeliveryState {
                on_data: Some(on_data),
                ..DeliveryState::default()
            }),
            idle: Condvar::new(),
        }
    }

    /// Run the callback with no lock held. Deliveries from different
    /// threads take turns so bytes keep their order.
    fn deliver(&self, data: &[u8]) -> bool {
        let current = thread::current().id();
        let mut state = lock(&self.state);
        loop {
            if state.cancelled {
                return false;
            }
            let running = state.running;
            match running {
                None => break,
                // The callback is feeding itself; it is already borrowed.
                Some(owner) if owner == current => return false,
                Some(_) => {
                    state = self
                        .idle
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
        let Some(on_data) = state.on_data.take() else {
            return false;
        };
        state.running = Some(current);
        drop(state);

        let mut lent = Lent {
            subscriber: self,
            on_data: Some(on_data),
        };
        if let Some(callback) = lent.on_data.as_mut() {
            callback(data);
        }
        true
    }

    /// Stop all further deliveries. Blocks until a delivery running on
    /// another thread has returned; called from inside the callback itself
    /// it returns at once and the callback is dropped when it finishes.
    fn cancel(&self) {
        let current = thread::current().id();
        let mut state = lock(&self.state);
        state.cancelled = true;
        let on_data = state.on_data.take();
        while state.running.is_some_and(|owner| owner != current) {
            state = self
                .idle
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(state);
        drop(on_data);
    }
}

/// A callback taken out for one delivery. Returned on drop, even if the
/// callback panics, unless the subscription was cancelled meanwhile.
struct Lent<'a> {
    subscriber: &'a Subscriber,
    on_data: Option<DataCallback>,
}

impl Drop for Lent<'_> {
    fn drop(&mut self) {
        let mut state = lock(&self.subscriber.state);
        state.running = None;
        if !state.cancelled {
            state.on_data = self.on_data.take();
        }
        drop(state);
        self.subscriber.idle.notify_all();
    }
}

pub struct ChannelRouter {
    host: Arc<dyn BackendHost>,
    subscriptions: Mutex<HashMap<SessionId, Arc<Subscriber>>>,
    next_serial: AtomicU64,
}

impl ChannelRouter {
    pub fn new(host: Arc<dyn BackendHost>) -> Self {
        Self {
            host,
            subscriptions: Mutex::new(HashMap::new()),
            next_serial: AtomicU64::new(1),
        }
    }

    /// Register the listener for `id`'s output, replacing any previous one.
    ///
    /// May be called from inside the listener being replaced.
    pub fn attach(&self, id: &SessionId, on_data: DataCallback) -> SubscriptionHandle {
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(Subscriber::new(serial, on_data));
        let previous = lock(&self.subscriptions).insert(id.clone(), subscriber);

        // Cancel outside the map lock: cancel waits for a running delivery.
        if let Some(previous) = previous {
            log::debug!("replacing subscription {} for session {id}", previous.serial);
            previous.cancel();
        }

        log::debug!("attached subscription {serial} to session {id}");
        SubscriptionHandle {
            id: id.clone(),
            serial,
        }
    }

    /// Drop a subscription. Detaching a stale or already-detached handle is
    /// a no-op.
    pub fn detach(&self, handle: &SubscriptionHandle) {
        let removed = {
            let mut subs = lock(&self.subscriptions);
            let current = subs
                .get(&handle.id)
                .is_some_and(|s| s.serial == handle.serial);
            if current {
                subs.remove(&handle.id)
            } else {
                None
            }
        };

        if let Some(subscriber) = removed {
            subscriber.cancel();
            log::debug!("detached subscription {} from session {}", handle.serial, handle.id);
        }
    }

    pub fn is_attached(&self, id: &SessionId) -> bool {
        lock(&self.subscriptions).contains_key(id)
    }

    /// Forward input bytes to `id`'s backend channel.
    pub fn send(&self, id: &SessionId, data: &[u8]) -> Result<(), MuxError> {
        if !self.is_attached(id) {
            return Err(MuxError::UnknownSession(id.clone()));
        }
        self.host.write(id, data)
    }

    /// Hand backend output to the session's current listener.
    ///
    /// Returns `false` if nobody is listening; the bytes are dropped.
    pub fn deliver(&self, id: &SessionId, data: &[u8]) -> bool {
        let subscriber = lock(&self.subscriptions).get(id).cloned();
        let Some(subscriber) = subscriber else {
            log::trace!("dropping {} bytes for unsubscribed session {id}", data.len());
            return false;
        };

        let delivered = subscriber.deliver(data);
        if !delivered {
            log::trace!("dropping late delivery for detached session {id}");
        }
        delivered
    }
}
