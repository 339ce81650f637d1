//! # ObserverSet: non-blocking fan-out over registered observers.
//!
//! [`ObserverSet`] distributes each [`MonitorEvent`] to every registered
//! observer **without awaiting** their processing.
//!
//! ## What it guarantees
//! - `emit(&MonitorEvent)` returns immediately.
//! - Per-observer FIFO (queue order).
//! - Panics inside observers are caught and logged (isolation).
//! - Observers whose worker has gone away are removed from the set on the
//!   next emit (disconnect detection).
//!
//! ## What it does **not** guarantee
//! - No retries on queue overflow: the event is dropped for that observer.
//!
//! ## Diagram
//! ```text
//!    emit(&MonitorEvent)
//!        │                      (Arc-clone per observer)
//!        ├──────────────► [queue O1] ─► worker O1 ─► on_event()
//!        ├──────────────► [queue O2] ─► worker O2 ─► on_event()
//!        └──────────────► [queue ON] ─► worker ON ─► on_event()
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use futures::FutureExt;
use tokio::sync::mpsc;

use crate::events::{Bus, MonitorEvent};

use super::Observe;

/// Handle identifying one registration; pass it to
/// [`ObserverSet::unregister`] to detach.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct Channel {
    name: &'static str,
    sender: mpsc::Sender<Arc<MonitorEvent>>,
}

/// Fan-out set with per-observer bounded queues and worker tasks.
///
/// Observers can be registered and unregistered at runtime; a monitor
/// connection registers on attach and unregisters on close.
pub struct ObserverSet {
    channels: RwLock<HashMap<ObserverId, Channel>>,
    next_id: AtomicU64,
}

impl ObserverSet {
    /// Creates an empty set.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            channels: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        })
    }

    /// Spawns a listener that forwards bus events into the set.
    ///
    /// Call once during registry init.
    pub fn spawn_listener(self: &Arc<Self>, bus: &Bus) {
        let mut rx = bus.subscribe();
        let me = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => me.emit(&ev),
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("observer listener lagged, skipped {n} events");
                    }
                }
            }
        });
    }

    /// Registers an observer and spawns its worker.
    pub fn register(&self, observer: Arc<dyn Observe>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cap = observer.queue_capacity().max(1);
        let name = observer.name();
        let (tx, mut rx) = mpsc::channel::<Arc<MonitorEvent>>(cap);

        tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                let fut = observer.on_event(ev.as_ref());
                if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                    log::warn!("observer '{}' panicked: {:?}", observer.name(), panic_err);
                }
            }
        });

        let mut channels = self.channels.write().expect("observer lock poisoned");
        channels.insert(id, Channel { name, sender: tx });
        id
    }

    /// Unregisters an observer; its queue closes and the worker drains out.
    ///
    /// Unknown ids are ignored (idempotent).
    pub fn unregister(&self, id: ObserverId) {
        let mut channels = self.channels.write().expect("observer lock poisoned");
        channels.remove(&id);
    }

    /// Fans one event out to all observers (non-blocking).
    ///
    /// A full queue drops the event for that observer only; a closed queue
    /// removes the observer from the set.
    pub fn emit(&self, event: &MonitorEvent) {
        let ev = Arc::new(event.clone());
        let mut dead: Vec<ObserverId> = Vec::new();
        {
            let channels = self.channels.read().expect("observer lock poisoned");
            for (id, channel) in channels.iter() {
                match channel.sender.try_send(Arc::clone(&ev)) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        log::warn!("observer '{}' dropped event: queue full", channel.name);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        dead.push(*id);
                    }
                }
            }
        }
        if !dead.is_empty() {
            let mut channels = self.channels.write().expect("observer lock poisoned");
            for id in dead {
                if channels.remove(&id).is_some() {
                    log::debug!("observer removed: worker gone");
                }
            }
        }
    }

    /// True if there are no observers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.read().expect("observer lock poisoned").is_empty()
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.read().expect("observer lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MonitorEventKind;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct Counter {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl Observe for Counter {
        async fn on_event(&self, _event: &MonitorEvent) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }

        fn name(&self) -> &'static str {
            "counter"
        }
    }

    fn event() -> MonitorEvent {
        MonitorEvent::new(MonitorEventKind::MachineRegistered).with_machine("m1")
    }

    async fn wait_for(counter: &Counter, n: usize) {
        for _ in 0..200 {
            if counter.seen.load(Ordering::SeqCst) >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("observer never saw {n} events");
    }

    #[tokio::test]
    async fn test_register_emit_unregister() {
        let set = ObserverSet::new();
        let counter = Arc::new(Counter {
            seen: AtomicUsize::new(0),
        });
        let id = set.register(counter.clone());
        assert_eq!(set.len(), 1);

        for _ in 0..3 {
            set.emit(&event());
        }
        wait_for(&counter, 3).await;

        set.unregister(id);
        assert!(set.is_empty());
        set.emit(&event());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.seen.load(Ordering::SeqCst), 3);
    }

    struct Stalled {
        seen: AtomicUsize,
        gate: tokio::sync::Notify,
    }

    #[async_trait]
    impl Observe for Stalled {
        async fn on_event(&self, _event: &MonitorEvent) {
            self.seen.fetch_add(1, Ordering::SeqCst);
            // Blocks the worker until the test releases it (it never does).
            self.gate.notified().await;
        }

        fn name(&self) -> &'static str {
            "stalled"
        }

        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn test_full_queue_drops_for_that_observer_only() {
        let set = ObserverSet::new();
        let stalled = Arc::new(Stalled {
            seen: AtomicUsize::new(0),
            gate: tokio::sync::Notify::new(),
        });
        let counter = Arc::new(Counter {
            seen: AtomicUsize::new(0),
        });
        set.register(stalled.clone());
        set.register(counter.clone());

        for _ in 0..5 {
            set.emit(&event());
        }

        // The healthy observer gets every event even while the stalled
        // one sits on its first delivery with a single-slot queue.
        wait_for(&counter, 5).await;
        assert!(stalled.seen.load(Ordering::SeqCst) <= 1);

        // Dropping is not removal: the stalled observer stays registered.
        assert_eq!(set.len(), 2);
    }

    struct PanicsOnce {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl Observe for PanicsOnce {
        async fn on_event(&self, _event: &MonitorEvent) {
            if self.seen.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("boom");
            }
        }

        fn name(&self) -> &'static str {
            "panics-once"
        }
    }

    #[tokio::test]
    async fn test_panicking_observer_keeps_its_worker() {
        let set = ObserverSet::new();
        let observer = Arc::new(PanicsOnce {
            seen: AtomicUsize::new(0),
        });
        set.register(observer.clone());

        set.emit(&event());
        set.emit(&event());

        for _ in 0..200 {
            if observer.seen.load(Ordering::SeqCst) >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // The panic was caught; the second event still got processed.
        assert_eq!(observer.seen.load(Ordering::SeqCst), 2);
        assert_eq!(set.len(), 1);
    }
}
