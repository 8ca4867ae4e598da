//! Connection bridge — buffered request events keyed by opaque identifiers.
//!
//! The host buffers each request's payload as an [`Event`] before the
//! connection ever reaches the dispatch loop. The loop correlates the
//! connection back to its event through the identifier carried in a reserved
//! header, consuming the event exactly once.

use std::collections::HashMap;

use bytes::Bytes;

/// A buffered request event: the raw body bytes the host queued for a
/// connection before handing it over.
#[derive(Debug, Clone)]
pub struct Event {
    payload: Bytes,
}

impl Event {
    /// Creates an event holding the given payload bytes.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Returns the buffered body bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consumes the event, returning its payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

/// Single-consumption store of pending [`Event`]s.
///
/// Lookup removes the entry: a second [`consume`](Self::consume) for the same
/// identifier yields `None` rather than stale data.
///
/// # Examples
///
/// ```
/// use nowbridge::bridge::{Event, EventStore};
///
/// let mut store = EventStore::new();
/// store.enqueue("req-1", Event::new(&b"payload"[..]));
///
/// let event = store.consume("req-1").unwrap();
/// assert_eq!(event.payload().as_ref(), b"payload");
/// assert!(store.consume("req-1").is_none());
/// ```
#[derive(Debug, Default)]
pub struct EventStore {
    events: HashMap<String, Event>,
}

impl EventStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an event under the given identifier, replacing any pending
    /// event with the same identifier.
    pub fn enqueue(&mut self, id: impl Into<String>, event: Event) {
        self.events.insert(id.into(), event);
    }

    /// Removes and returns the event for `id`.
    ///
    /// `None` means the identifier is unknown or was already consumed — the
    /// two cases are indistinguishable by design.
    pub fn consume(&mut self, id: &str) -> Option<Event> {
        self.events.remove(id)
    }

    /// Returns the number of pending events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if no events are pending.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
