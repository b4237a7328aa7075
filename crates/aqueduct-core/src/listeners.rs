//! Property listener multiplexing.
//!
//! Many logical subscribers per `(resource, property)` share one native
//! listener registration. The native listener is registered when the first
//! subscriber arrives and removed after the last one leaves.
//!
//! Two locks are involved:
//!
//! - `registration` serializes subscribe/unsubscribe and is held across the
//!   native (un)registration call.
//! - `sets` guards the subscriber map and is only held to copy or swap a
//!   set. It is never held while a subscriber runs or while the engine is
//!   called, so subscribers may subscribe and unsubscribe from inside their
//!   own callback.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::thunk::{CallbackDiagnostics, CallbackFailure, CallbackKind, CallbackResult};

/// A property change reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyEvent {
    pub property_id: u32,
    pub scope: u32,
    pub element: u32,
}

/// Receives property change notifications.
///
/// Called on an engine thread, possibly concurrently with other
/// notifications.
pub trait PropertyListener: Send + Sync + 'static {
    fn property_changed(&self, event: &PropertyEvent) -> CallbackResult;
}

impl<F> PropertyListener for F
where
    F: Fn(&PropertyEvent) -> CallbackResult + Send + Sync + 'static,
{
    fn property_changed(&self, event: &PropertyEvent) -> CallbackResult {
        self(event)
    }
}

/// Identifies one subscription for [`ListenerMultiplexer::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    pub property_id: u32,
    serial: u64,
}

#[derive(Clone)]
struct Subscriber {
    serial: u64,
    listener: Arc<dyn PropertyListener>,
}

type SubscriberSet = Arc<[Subscriber]>;

/// Per-resource map from property id to subscriber set.
pub struct ListenerMultiplexer {
    registration: Mutex<()>,
    sets: Mutex<HashMap<u32, SubscriberSet>>,
    next_serial: AtomicU64,
}

impl ListenerMultiplexer {
    pub fn new() -> Self {
        Self {
            registration: Mutex::new(()),
            sets: Mutex::new(HashMap::new()),
            next_serial: AtomicU64::new(1),
        }
    }

    /// Add a subscriber. `register` performs the native registration and
    /// is called only when `property_id` has no subscribers yet.
    pub fn subscribe(
        &self,
        property_id: u32,
        listener: Arc<dyn PropertyListener>,
        register: impl FnOnce() -> Result<()>,
    ) -> Result<SubscriptionId> {
        let _registration = self.registration.lock();
        let existing = self.sets.lock().get(&property_id).cloned();
        if existing.is_none() {
            register()?;
            log::debug!("registered native listener for property {}", property_id);
        }

        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let subscriber = Subscriber { serial, listener };
        let set: SubscriberSet = match existing {
            Some(set) => set.iter().cloned().chain([subscriber]).collect(),
            None => Arc::from([subscriber]),
        };
        self.sets.lock().insert(property_id, set);

        Ok(SubscriptionId {
            property_id,
            serial,
        })
    }

    /// Remove a subscriber. `unregister` removes the native registration
    /// and is called only for the last subscriber of a property; if it
    /// fails, the subscriber is kept.
    ///
    /// Returns `Ok(false)` for unknown subscriptions.
    pub fn unsubscribe(
        &self,
        id: SubscriptionId,
        unregister: impl FnOnce() -> Result<()>,
    ) -> Result<bool> {
        let _registration = self.registration.lock();
        let Some(set) = self.sets.lock().get(&id.property_id).cloned() else {
            return Ok(false);
        };
        if !set.iter().any(|s| s.serial == id.serial) {
            return Ok(false);
        }

        if set.len() == 1 {
            unregister()?;
            self.sets.lock().remove(&id.property_id);
            log::debug!("removed native listener for property {}", id.property_id);
        } else {
            let remaining: SubscriberSet = set
                .iter()
                .filter(|s| s.serial != id.serial)
                .cloned()
                .collect();
            self.sets.lock().insert(id.property_id, remaining);
        }
        Ok(true)
    }

    /// Drop every subscriber, calling `unregister` once per property that
    /// had a native registration. Returns the number of properties.
    pub fn drain(&self, mut unregister: impl FnMut(u32) -> Result<()>) -> usize {
        let _registration = self.registration.lock();
        let sets = std::mem::take(&mut *self.sets.lock());
        for &property_id in sets.keys() {
            if let Err(err) = unregister(property_id) {
                log::warn!(
                    "failed to remove native listener for property {}: {}",
                    property_id,
                    err
                );
            }
        }
        sets.len()
    }

    /// Fan one native notification out to every subscriber.
    pub fn dispatch(&self, event: &PropertyEvent, diagnostics: &CallbackDiagnostics) {
        let Some(set) = self.sets.lock().get(&event.property_id).cloned() else {
            return;
        };
        for subscriber in set.iter() {
            let result =
                panic::catch_unwind(AssertUnwindSafe(|| subscriber.listener.property_changed(event)));
            let failure = match result {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => CallbackFailure::error(CallbackKind::PropertyChanged, err.status()),
                Err(_) => CallbackFailure::panic(CallbackKind::PropertyChanged),
            };
            diagnostics.record(failure);
            log::error!(
                "property listener for property {} failed: {}",
                event.property_id,
                failure
            );
        }
    }

    pub fn subscriber_count(&self, property_id: u32) -> usize {
        self.sets.lock().get(&property_id).map_or(0, |set| set.len())
    }

    /// Properties that currently hold a native registration.
    pub fn registered_properties(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.sets.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for ListenerMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}
