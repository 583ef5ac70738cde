//! Event types for the feed event system
//!
//! Provides the shared event definitions and the EventBus display adapters
//! subscribe to.

mod render_types;
mod session_types;

pub use render_types::{DisplayComment, FilteredComment, RenderInstruction, TextSegment};
pub use session_types::{ConnectionState, ErrorKind, FeedCounts, PaginationView, TransportMode};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::model::{CustomerStatus, FeedTarget};

/// Feed event types
///
/// Broadcast via EventBus and serializable for transmission to a display
/// collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeedEvent {
    /// A session was created for a target
    SessionStarted {
        session_id: Uuid,
        target: FeedTarget,
        mode: TransportMode,
        timestamp: DateTime<Utc>,
    },

    /// A session was torn down
    SessionStopped {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Connection manager changed state
    ConnectionStateChanged {
        old_state: ConnectionState,
        new_state: ConnectionState,
        timestamp: DateTime<Utc>,
    },

    /// Display update
    Render {
        session_id: Uuid,
        instruction: RenderInstruction,
    },

    /// Counter update (total / new / filtered)
    CountsUpdated {
        session_id: Uuid,
        counts: FeedCounts,
    },

    /// Pagination control update
    PaginationChanged {
        session_id: Uuid,
        pagination: PaginationView,
    },

    /// A customer lookup resolved for a phone
    CustomerStatusUpdated {
        session_id: Uuid,
        phone: String,
        status: CustomerStatus,
    },

    /// Order map was rebuilt
    OrdersReplaced {
        session_id: Uuid,
        order_count: usize,
    },

    /// Error banner raised
    ErrorRaised {
        kind: ErrorKind,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Error banner cleared
    ErrorCleared { timestamp: DateTime<Utc> },
}

impl FeedEvent {
    /// Session this event belongs to, if any
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            FeedEvent::SessionStarted { session_id, .. }
            | FeedEvent::SessionStopped { session_id, .. }
            | FeedEvent::Render { session_id, .. }
            | FeedEvent::CountsUpdated { session_id, .. }
            | FeedEvent::PaginationChanged { session_id, .. }
            | FeedEvent::CustomerStatusUpdated { session_id, .. }
            | FeedEvent::OrdersReplaced { session_id, .. } => Some(*session_id),
            FeedEvent::ConnectionStateChanged { .. }
            | FeedEvent::ErrorRaised { .. }
            | FeedEvent::ErrorCleared { .. } => None,
        }
    }
}

/// Central event distribution bus
///
/// Wraps a tokio broadcast channel. Cloning shares the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FeedEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    pub fn emit(
        &self,
        event: FeedEvent,
    ) -> Result<usize, broadcast::error::SendError<FeedEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: FeedEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
