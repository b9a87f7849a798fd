//! Resumability support for SSE streams.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::mcp::jsonrpc::JsonRpcMessage;

use super::StreamId;

/// Default number of events kept by [`InMemoryEventStore`].
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    pub event_id: String,
    pub stream_id: StreamId,
    pub message: JsonRpcMessage,
}

/// Events to resend after a client reconnects with `Last-Event-Id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Replay {
    /// Stream the last seen event belonged to.
    pub stream_id: StreamId,
    /// Later events of that stream, oldest first.
    pub events: Vec<StoredEvent>,
}

/// Stores outbound SSE events so a reconnecting client can catch up.
pub trait EventStore: Send + Sync {
    /// Record a message sent on `stream_id` and return its event id.
    fn store_event(&self, stream_id: &str, message: &JsonRpcMessage) -> String;

    /// Events of the same stream recorded after `last_event_id`, or `None`
    /// when the id is unknown (expired or never issued).
    fn replay_events_after(&self, last_event_id: &str) -> Option<Replay>;
}

/// Bounded in-memory [`EventStore`]; the oldest events are evicted first.
#[derive(Debug)]
pub struct InMemoryEventStore {
    capacity: usize,
    state: Mutex<StoreState>,
}

#[derive(Debug, Default)]
struct StoreState {
    next_seq: u64,
    events: VecDeque<StoredEvent>,
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl InMemoryEventStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(StoreState::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        // Every push/pop leaves the queue consistent, so poisoning is harmless.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventStore for InMemoryEventStore {
    fn store_event(&self, stream_id: &str, message: &JsonRpcMessage) -> String {
        let mut state = self.lock();
        state.next_seq += 1;
        let event_id = format!("{stream_id}_{}", state.next_seq);
        if state.events.len() == self.capacity {
            state.events.pop_front();
        }
        state.events.push_back(StoredEvent {
            event_id: event_id.clone(),
            stream_id: stream_id.to_string(),
            message: message.clone(),
        });
        event_id
    }

    fn replay_events_after(&self, last_event_id: &str) -> Option<Replay> {
        let state = self.lock();
        let position = state
            .events
            .iter()
            .position(|event| event.event_id == last_event_id)?;
        let stream_id = state.events[position].stream_id.clone();
        let events = state
            .events
            .iter()
            .skip(position + 1)
            .filter(|event| event.stream_id == stream_id)
            .cloned()
            .collect();
        Some(Replay { stream_id, events })
    }
}
