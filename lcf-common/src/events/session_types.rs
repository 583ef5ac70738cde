//! Session-level state types carried by events

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Idle,
    Starting,
    Streaming,
    Polling,
    Stopped,
}

impl ConnectionState {
    /// A transport is open
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Streaming | ConnectionState::Polling)
    }
}

/// How comment batches reach the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TransportMode {
    /// Long-lived push connection
    Stream,
    /// Fixed-interval pull
    Poll { interval_secs: u64 },
}

impl TransportMode {
    pub fn poll(interval: Duration) -> Self {
        TransportMode::Poll {
            interval_secs: interval.as_secs().max(1),
        }
    }

    pub fn is_poll(self) -> bool {
        matches!(self, TransportMode::Poll { .. })
    }

    /// Connection state reached once this transport is open
    pub fn active_state(self) -> ConnectionState {
        match self {
            TransportMode::Stream => ConnectionState::Streaming,
            TransportMode::Poll { .. } => ConnectionState::Polling,
        }
    }
}

/// User-visible error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Missing target or credential; blocks start
    Configuration,
    /// Push drop or poll failure; recovered automatically
    Transport,
}

/// Counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCounts {
    /// Server-reported total, or comments seen so far when upstream is silent
    pub total: u64,
    /// Comments held in the session
    pub accumulated: usize,
    /// Comments classified as new since first load
    pub new_count: u64,
    /// Search hits, when a search term is active
    pub filtered: Option<usize>,
}

/// Pagination control state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationView {
    pub visible: bool,
    pub current_page: u32,
    pub total_pages: u32,
    pub prev_enabled: bool,
    pub next_enabled: bool,
}
