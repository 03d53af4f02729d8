//! The per-world pub/sub bus (spec §4.3, C3).
//!
//! Grounded almost verbatim in `querymt_agent::event_bus::EventBus`: a
//! `tokio::sync::broadcast` channel for subscribers plus a separate observer
//! list fanned out onto detached `JoinSet` tasks, so a slow or failing
//! observer can never block bus delivery. `AgentEventKind`'s domain-tracking
//! variants are gone; `EventKind` (spec-shaped) takes their place.

use crate::events::{EventKind, EventObserver, WorldEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::broadcast;
use tokio::task;
use tokio::task::JoinSet;

const EVENT_BUS_BUFFER: usize = 1024;

pub type ObserverToken = u64;

type ObserverList = Vec<(ObserverToken, Arc<dyn EventObserver>)>;

/// One instance lives per world (spec §4.3: "One bus per world").
pub struct EventBus {
    sender: broadcast::Sender<WorldEvent>,
    observers: Arc<Mutex<ObserverList>>,
    sequence: AtomicU64,
    observer_sequence: AtomicU64,
    observer_tasks: Arc<TokioMutex<JoinSet<()>>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUS_BUFFER);
        Self {
            sender,
            observers: Arc::new(Mutex::new(Vec::new())),
            sequence: AtomicU64::new(1),
            observer_sequence: AtomicU64::new(1),
            observer_tasks: Arc::new(TokioMutex::new(JoinSet::new())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorldEvent> {
        self.sender.subscribe()
    }

    pub fn add_observer(&self, observer: Arc<dyn EventObserver>) -> ObserverToken {
        let token = self.observer_sequence.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().push((token, observer));
        token
    }

    pub fn add_observers(&self, observers: Vec<Arc<dyn EventObserver>>) {
        let mut current = self.observers.lock();
        for observer in observers {
            let token = self.observer_sequence.fetch_add(1, Ordering::Relaxed);
            current.push((token, observer));
        }
    }

    /// Returns true when a matching token was found and removed.
    pub fn remove_observer(&self, token: ObserverToken) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(t, _)| *t != token);
        before != observers.len()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    /// Publish an event, assigning the next sequence number and the current
    /// timestamp.
    pub fn publish(&self, world_id: &str, kind: EventKind) {
        let event = self.build_event(world_id, kind);
        self.publish_raw(event);
    }

    /// Publish a fully materialized event without touching seq/timestamp —
    /// used when replaying persisted events or relaying from another bus.
    pub fn publish_raw(&self, event: WorldEvent) {
        self.bump_sequence_after_raw(event.seq);
        self.dispatch_event(event);
    }

    pub async fn shutdown(&self) {
        log::debug!("event bus: shutting down, aborting all observer tasks");
        let mut tasks = self.observer_tasks.lock().await;
        tasks.shutdown().await;
    }

    fn dispatch_event(&self, event: WorldEvent) {
        let _ = self.sender.send(event.clone());

        let observers: Vec<_> = self
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        let tasks = self.observer_tasks.clone();
        task::spawn(async move {
            let mut tasks_guard = tasks.lock().await;
            for observer in observers {
                let event = event.clone();
                tasks_guard.spawn(async move {
                    if let Err(err) = observer.on_event(&event).await {
                        log::error!(
                            "event bus observer failure: world_id={}, seq={}, error={}",
                            event.world_id,
                            event.seq,
                            err
                        );
                    }
                });
            }
        });
    }

    fn bump_sequence_after_raw(&self, seq: u64) {
        let min_next = seq.saturating_add(1);
        let mut current = self.sequence.load(Ordering::Relaxed);
        while current < min_next {
            match self
                .sequence
                .compare_exchange_weak(current, min_next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    fn build_event(&self, world_id: &str, kind: EventKind) -> WorldEvent {
        WorldEvent {
            seq: self.sequence.fetch_add(1, Ordering::Relaxed),
            timestamp: time::OffsetDateTime::now_utc().unix_timestamp(),
            world_id: world_id.to_string(),
            kind,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
