//! Fire-notification fan-out.
//!
//! Fires travel Event → Profile → Scheduler as a pipeline of subscriber
//! lists: the profile subscribes to each of its events, the scheduler
//! subscribes to each profile, and the host subscribes to the scheduler.
//! Delivery is synchronous on the firing event's timer task, exactly once
//! per subscriber per fire.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};

use crate::event::Event;

/// Callback invoked when an event fires.
pub type FireSubscriber = Arc<dyn Fn(&Arc<Event>) + Send + Sync>;

/// A list of fire subscribers with panic-isolated dispatch.
#[derive(Default)]
pub struct FireHub {
    subscribers: RwLock<Vec<FireSubscriber>>,
}

impl FireHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: FireSubscriber) {
        self.lock_write().push(subscriber);
    }

    pub fn clear(&self) {
        self.lock_write().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    /// Deliver one fire to every subscriber. A panicking subscriber is
    /// logged and never aborts the fire chain.
    pub fn dispatch(&self, event: &Arc<Event>) {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for subscriber in subscribers {
            if catch_unwind(AssertUnwindSafe(|| subscriber(event))).is_err() {
                tracing::warn!("⚠️ Fire subscriber panicked for event '{}'", event.name());
            }
        }
    }

    fn lock_write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<FireSubscriber>> {
        self.subscribers.write().unwrap_or_else(|e| e.into_inner())
    }
}
