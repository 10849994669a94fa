//! Membership events and the bus that delivers them.
//!
//! Each `FingerTable` owns its own `EventBus`; there is no global bus.
//! Delivery is synchronous and in subscription order. Mutations and the
//! delivery of the events they produce happen inside one dispatch section,
//! so no other thread can change the table before an event has reached
//! every subscriber.

use crate::entry::SiteEntry;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock, Weak};
use std::thread::{self, ThreadId};

/// Membership changes surfaced to consumers of the table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "entry", rename_all = "camelCase")]
pub enum TableEvent {
    /// A site was seen for the first time.
    Join(SiteEntry),
    /// A site went silent past the timeout and was evicted.
    Failure(SiteEntry),
    /// The table finished initialization and is safe to query.
    Ready,
}

/// Subscription handle that unsubscribes automatically when dropped.
///
/// Follows the disposer pattern: hold this value to keep receiving events,
/// drop it (or let it go out of scope) to unsubscribe.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

type Callback = Arc<dyn Fn(&TableEvent) + Send + Sync>;

/// Event bus for publishing table events to subscribers.
///
/// Wrap in `Arc` to enable subscriptions.
pub struct EventBus {
    callbacks: RwLock<Vec<(usize, Callback)>>,
    next_id: AtomicUsize,
    /// Events waiting for delivery, in the order they were produced
    pending: Mutex<VecDeque<TableEvent>>,
    /// Thread currently inside a dispatch, and how deeply it has re-entered
    owner: Mutex<Option<(ThreadId, usize)>>,
    released: Condvar,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
            next_id: AtomicUsize::new(0),
            pending: Mutex::new(VecDeque::new()),
            owner: Mutex::new(None),
            released: Condvar::new(),
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events. Returns `Subscription` that unsubscribes on drop.
    ///
    /// Requires `self` to be wrapped in `Arc`.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(&TableEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: usize) {
        // emit() never holds the read lock while a callback runs, so dropping
        // a subscription from inside a callback cannot deadlock here.
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(i, _)| *i != id);
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.callbacks.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Emit an event to all subscribers immediately.
    pub fn emit(&self, event: &TableEvent) {
        // Clone the callback list to prevent deadlock if a callback calls subscribe.
        let callbacks: Vec<_> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(event);
        }
    }

    /// Enter a dispatch section.
    ///
    /// Only one thread is inside at a time; others block here until the owner
    /// has delivered every event it produced. The owning thread may re-enter
    /// (a callback mutating the table), in which case its events are queued
    /// behind the event currently being delivered.
    pub(crate) fn begin(&self) -> Dispatch<'_> {
        let me = thread::current().id();
        let owner = self.owner.lock().unwrap_or_else(|e| e.into_inner());
        let mut owner = self
            .released
            .wait_while(owner, |owner| owner.is_some_and(|(id, _)| id != me))
            .unwrap_or_else(|e| e.into_inner());
        match owner.as_mut() {
            Some((_, depth)) => {
                *depth += 1;
                Dispatch { bus: self, outermost: false }
            }
            None => {
                *owner = Some((me, 1));
                Dispatch { bus: self, outermost: true }
            }
        }
    }

    fn pending(&self) -> MutexGuard<'_, VecDeque<TableEvent>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn drain(&self) {
        loop {
            // Take the whole batch so nothing lingers in `pending` if a
            // callback panics part way through.
            let batch = std::mem::take(&mut *self.pending());
            if batch.is_empty() {
                return;
            }
            for event in &batch {
                self.emit(event);
            }
        }
    }

    fn leave(&self, outermost: bool) {
        let mut owner = self.owner.lock().unwrap_or_else(|e| e.into_inner());
        if outermost {
            if thread::panicking() {
                // Undelivered events describe a state other callers may change
                // as soon as we release; drop them instead of delivering late.
                self.pending().clear();
            }
            *owner = None;
            drop(owner);
            self.released.notify_all();
        } else if let Some((_, depth)) = owner.as_mut() {
            *depth -= 1;
        }
    }
}

/// Guard for a dispatch section, returned by `EventBus::begin`.
pub(crate) struct Dispatch<'a> {
    bus: &'a EventBus,
    outermost: bool,
}

impl Dispatch<'_> {
    /// Queue events and, for the outermost section, deliver them all now.
    pub(crate) fn publish(&self, events: impl IntoIterator<Item = TableEvent>) {
        self.bus.pending().extend(events);
        if self.outermost {
            self.bus.drain();
        }
    }
}

impl Drop for Dispatch<'_> {
    fn drop(&mut self) {
        self.bus.leave(self.outermost);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::Site;
    use std::time::Duration;
    use web_time::UNIX_EPOCH;

    fn entry(id: u64) -> SiteEntry {
        SiteEntry::create(
            Site::new(id, "127.0.0.1", 8000 + id as u16),
            UNIX_EPOCH + Duration::from_secs(1),
        )
    }

    #[test]
    fn test_subscribe_and_emit() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let _sub = bus.subscribe(move |_event| {
            count_clone.fetch_add(1, Ordering::Relaxed);
        });

        bus.emit(&TableEvent::Ready);

        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_subscription_unsubscribes_on_drop() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        {
            let _sub = bus.subscribe(move |_event| {
                count_clone.fetch_add(1, Ordering::Relaxed);
            });

            bus.emit(&TableEvent::Ready);
            assert_eq!(count.load(Ordering::Relaxed), 1);
            assert_eq!(bus.subscriber_count(), 1);
        }

        bus.emit(&TableEvent::Ready);

        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_multiple_subscribers_in_order() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen1 = Arc::clone(&seen);
        let _sub1 = bus.subscribe(move |_| seen1.lock().unwrap().push("first"));
        let seen2 = Arc::clone(&seen);
        let _sub2 = bus.subscribe(move |_| seen2.lock().unwrap().push("second"));

        bus.emit(&TableEvent::Ready);

        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_publish_delivers_events_in_order() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        let _sub = bus.subscribe(move |event| seen_clone.lock().unwrap().push(event.clone()));

        bus.begin()
            .publish([TableEvent::Join(entry(1)), TableEvent::Join(entry(2))]);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![TableEvent::Join(entry(1)), TableEvent::Join(entry(2))]
        );
    }

    #[test]
    fn test_reentrant_publish_is_delivered_after_current_event() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        let bus_clone = Arc::clone(&bus);
        let _sub = bus.subscribe(move |event| {
            seen_clone.lock().unwrap().push(event.clone());
            if let TableEvent::Join(e) = event
                && e.id().as_u64() == 1
            {
                bus_clone.begin().publish([TableEvent::Join(entry(2))]);
            }
        });

        bus.begin()
            .publish([TableEvent::Join(entry(1)), TableEvent::Ready]);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                TableEvent::Join(entry(1)),
                TableEvent::Ready,
                TableEvent::Join(entry(2)),
            ]
        );
    }

    #[test]
    fn test_other_thread_waits_for_delivery() {
        let bus = Arc::new(EventBus::new());
        let dispatch = bus.begin();

        let entered = Arc::new(AtomicUsize::new(0));
        let handle = {
            let bus = Arc::clone(&bus);
            let entered = Arc::clone(&entered);
            thread::spawn(move || {
                let _dispatch = bus.begin();
                entered.fetch_add(1, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(entered.load(Ordering::SeqCst), 0);

        drop(dispatch);
        handle.join().unwrap();
        assert_eq!(entered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_callback_leaves_nothing_queued() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        let _sub = bus.subscribe(move |event| {
            if let TableEvent::Join(e) = event
                && e.id().as_u64() == 1
            {
                panic!("subscriber failed");
            }
            seen_clone.lock().unwrap().push(event.clone());
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            bus.begin()
                .publish([TableEvent::Join(entry(1)), TableEvent::Join(entry(5))]);
        }));
        assert!(result.is_err());

        bus.begin().publish([TableEvent::Join(entry(2))]);

        assert_eq!(*seen.lock().unwrap(), vec![TableEvent::Join(entry(2))]);
    }

    #[test]
    fn test_drop_while_emitting_always_unsubscribes() {
        let bus = Arc::new(EventBus::new());
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let emitter = {
            let bus = Arc::clone(&bus);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    bus.emit(&TableEvent::Ready);
                }
            })
        };

        for _ in 0..100_000 {
            let sub = bus.subscribe(|_| {});
            drop(sub);
        }

        stop.store(true, Ordering::Relaxed);
        emitter.join().unwrap();

        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_table_event_serialization() {
        let json = serde_json::to_string(&TableEvent::Join(entry(3))).unwrap();
        assert!(json.contains("\"type\":\"join\""));
        assert!(json.contains("\"id\":3"));

        let json = serde_json::to_string(&TableEvent::Ready).unwrap();
        assert_eq!(json, "{\"type\":\"ready\"}");
    }
}
