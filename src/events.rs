//! Lifecycle events and the synchronous event emitter.
//!
//! Listeners are invoked in registration order with the constructed event.
//! A panicking listener is caught and logged; the remaining listeners and
//! the collection pipeline continue unaffected. Listeners receive only the
//! event payload, never a handle to the collector.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Lifecycle event types emitted during collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CollectionStarted,
    AdCollected,
    PageFetched,
    ErrorOccurred,
    RateLimited,
    SessionRefreshed,
    CollectionFinished,
}

impl EventType {
    pub const ALL: [EventType; 7] = [
        EventType::CollectionStarted,
        EventType::AdCollected,
        EventType::PageFetched,
        EventType::ErrorOccurred,
        EventType::RateLimited,
        EventType::SessionRefreshed,
        EventType::CollectionFinished,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CollectionStarted => "collection_started",
            Self::AdCollected => "ad_collected",
            Self::PageFetched => "page_fetched",
            Self::ErrorOccurred => "error_occurred",
            Self::RateLimited => "rate_limited",
            Self::SessionRefreshed => "session_refreshed",
            Self::CollectionFinished => "collection_finished",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "collection_started" => Some(Self::CollectionStarted),
            "ad_collected" => Some(Self::AdCollected),
            "page_fetched" => Some(Self::PageFetched),
            "error_occurred" => Some(Self::ErrorOccurred),
            "rate_limited" => Some(Self::RateLimited),
            "session_refreshed" => Some(Self::SessionRefreshed),
            "collection_finished" => Some(Self::CollectionFinished),
            _ => None,
        }
    }
}

/// One lifecycle event: type tag, JSON payload, and creation time.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub event_type: EventType,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: EventType, data: Value) -> Self {
        Self {
            event_type,
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Callback signature for lifecycle listeners.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Handle returned from [`EventEmitter::on`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

/// Synchronous fan-out of lifecycle events with panic isolation.
///
/// Registration and removal are serialized relative to emission; emission
/// snapshots the listener list so a listener may unregister itself.
#[derive(Default)]
pub struct EventEmitter {
    listeners: Mutex<HashMap<EventType, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `event_type`. Listeners fire in registration
    /// order.
    pub fn on(&self, event_type: EventType, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .expect("event emitter lock poisoned")
            .entry(event_type)
            .or_default()
            .push((id, listener));
        id
    }

    /// Remove a previously registered listener. Unknown ids are a no-op.
    pub fn off(&self, event_type: EventType, id: ListenerId) {
        if let Some(list) = self
            .listeners
            .lock()
            .expect("event emitter lock poisoned")
            .get_mut(&event_type)
        {
            list.retain(|(lid, _)| *lid != id);
        }
    }

    /// Construct an event and invoke every listener registered for its type.
    pub fn emit(&self, event_type: EventType, data: Value) -> Event {
        let event = Event::new(event_type, data);
        let snapshot: Vec<Listener> = self
            .listeners
            .lock()
            .expect("event emitter lock poisoned")
            .get(&event_type)
            .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        for listener in snapshot {
            let result = catch_unwind(AssertUnwindSafe(|| (*listener)(&event)));
            if result.is_err() {
                warn!(event = event_type.as_str(), "event listener panicked");
            }
        }
        event
    }

    pub fn has_listeners(&self, event_type: EventType) -> bool {
        self.listener_count(event_type) > 0
    }

    pub fn listener_count(&self, event_type: EventType) -> usize {
        self.listeners
            .lock()
            .expect("event emitter lock poisoned")
            .get(&event_type)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn listeners_fire_in_registration_order() {
        let emitter = EventEmitter::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = Arc::clone(&order);
            emitter.on(
                EventType::AdCollected,
                Arc::new(move |_| order.lock().unwrap().push(n)),
            );
        }

        emitter.emit(EventType::AdCollected, json!({}));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn panicking_listener_does_not_stop_the_rest() {
        let emitter = EventEmitter::new();
        let hits = Arc::new(AtomicUsize::new(0));

        emitter.on(
            EventType::AdCollected,
            Arc::new(|_| panic!("listener bug")),
        );
        let hits2 = Arc::clone(&hits);
        emitter.on(
            EventType::AdCollected,
            Arc::new(move |_| {
                hits2.fetch_add(1, Ordering::SeqCst);
            }),
        );

        emitter.emit(EventType::AdCollected, json!({}));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn off_removes_only_the_target() {
        let emitter = EventEmitter::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = Arc::clone(&hits);
        let id = emitter.on(
            EventType::PageFetched,
            Arc::new(move |_| {
                h1.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let h2 = Arc::clone(&hits);
        emitter.on(
            EventType::PageFetched,
            Arc::new(move |_| {
                h2.fetch_add(10, Ordering::SeqCst);
            }),
        );

        emitter.off(EventType::PageFetched, id);
        emitter.emit(EventType::PageFetched, json!({}));
        assert_eq!(hits.load(Ordering::SeqCst), 10);
        assert_eq!(emitter.listener_count(EventType::PageFetched), 1);
    }

    #[test]
    fn emit_returns_event_with_payload() {
        let emitter = EventEmitter::new();
        let event = emitter.emit(EventType::RateLimited, json!({"wait_seconds": 5}));
        assert_eq!(event.event_type, EventType::RateLimited);
        assert_eq!(event.data["wait_seconds"], 5);
    }

    #[test]
    fn event_type_round_trips_through_strings() {
        for et in EventType::ALL {
            assert_eq!(EventType::from_str(et.as_str()), Some(et));
        }
        assert_eq!(EventType::from_str("nope"), None);
    }
}
