//! Feed controller
//!
//! Entry point for the host: start and stop sessions, switch transports,
//! search, paginate and refresh enrichment. Holds at most one session and
//! one transport; a new start tears down whatever was running before.

use chrono::Utc;
use lcf_common::config::FeedConfig;
use lcf_common::events::{ConnectionState, ErrorKind, EventBus, FeedEvent, TransportMode};
use lcf_common::model::FeedTarget;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::connection::TransportHandle;
use crate::error::{Error, Result};
use crate::session::{FeedSession, SessionSettings};
use crate::sources::Sources;

struct ControllerInner {
    state: ConnectionState,
    session: Option<Arc<FeedSession>>,
    transport: Option<TransportHandle>,
}

/// Live comment feed controller
pub struct FeedController {
    config: FeedConfig,
    sources: Sources,
    events: EventBus,
    inner: Mutex<ControllerInner>,
}

impl FeedController {
    pub fn new(config: FeedConfig, sources: Sources, events: EventBus) -> Self {
        Self {
            config,
            sources,
            events,
            inner: Mutex::new(ControllerInner {
                state: ConnectionState::Idle,
                session: None,
                transport: None,
            }),
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// Current session, if one is running
    pub async fn session(&self) -> Option<Arc<FeedSession>> {
        self.inner.lock().await.session.clone()
    }

    /// Start fetching `target` over `mode`
    ///
    /// Any running session is stopped first, so exactly one transport is
    /// ever open. A missing target or credential fails the attempt and
    /// returns to `Idle` without opening a transport.
    pub async fn start(&self, target: FeedTarget, mode: TransportMode) -> Result<Uuid> {
        let mut inner = self.inner.lock().await;

        self.teardown(&mut inner).await;
        self.transition(&mut inner, ConnectionState::Starting);

        let credential = match self.validate_start(&target) {
            Ok(credential) => credential,
            Err(e) => {
                warn!(target = %target, error = %e, "Start rejected");
                self.events.emit_lossy(FeedEvent::ErrorRaised {
                    kind: ErrorKind::Configuration,
                    message: e.to_string(),
                    timestamp: Utc::now(),
                });
                self.transition(&mut inner, ConnectionState::Idle);
                return Err(e);
            }
        };

        let settings = SessionSettings {
            page_size: self.config.page_size,
            new_flag_duration: self.config.new_flag_duration,
            reconnect_delay: self.config.reconnect_delay,
        };
        let session = FeedSession::new(
            target.clone(),
            mode,
            credential,
            settings,
            self.sources.clone(),
            self.events.clone(),
        );
        let session_id = session.id();

        info!(session_id = %session_id, target = %target, mode = ?mode, "Session started");
        self.events.emit_lossy(FeedEvent::SessionStarted {
            session_id,
            target,
            mode,
            timestamp: Utc::now(),
        });

        // Orders load alongside the first batch; failures only degrade display
        let loader = Arc::clone(&session);
        tokio::spawn(async move {
            match loader.load_orders(false).await {
                Ok(order_count) => debug!(session_id = %loader.id(), order_count, "Initial orders loaded"),
                Err(e) => debug!(session_id = %loader.id(), error = %e, "Starting without order data"),
            }
        });

        inner.transport = Some(TransportHandle::open(Arc::clone(&session), mode));
        inner.session = Some(session);
        self.transition(&mut inner, mode.active_state());

        Ok(session_id)
    }

    /// Stop the running session; no-op when idle
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        if self.teardown(&mut inner).await {
            self.transition(&mut inner, ConnectionState::Stopped);
        }
    }

    /// Set or clear (`None` or blank) the search term
    pub async fn set_search_term(&self, term: Option<&str>) {
        if let Some(session) = self.session().await {
            session.set_search_term(term).await;
        }
    }

    /// Navigate in poll mode; returns whether a fetch was triggered
    pub async fn go_to_page(&self, page: i64) -> bool {
        let inner = self.inner.lock().await;
        let (Some(session), Some(transport)) = (&inner.session, &inner.transport) else {
            return false;
        };

        match session.go_to_page(page).await {
            Some(window) => transport.request_fetch(window),
            None => false,
        }
    }

    /// Reload order records, bypassing upstream caching
    pub async fn refresh_enrichment(&self) -> Result<usize> {
        let session = self
            .session()
            .await
            .ok_or_else(|| Error::Config("no active session".to_string()))?;
        session.load_orders(true).await
    }

    fn validate_start(&self, target: &FeedTarget) -> Result<String> {
        if !target.is_complete() {
            return Err(Error::Config("page id and post id are required".to_string()));
        }
        self.sources
            .credential()
            .ok_or_else(|| Error::Config("access token is required".to_string()))
    }

    /// Close transport then session; returns whether anything was running
    async fn teardown(&self, inner: &mut ControllerInner) -> bool {
        let had_transport = match inner.transport.take() {
            Some(transport) => {
                transport.close().await;
                true
            }
            None => false,
        };

        match inner.session.take() {
            Some(session) => {
                session.close();
                info!(session_id = %session.id(), "Session stopped");
                self.events.emit_lossy(FeedEvent::SessionStopped {
                    session_id: session.id(),
                    timestamp: Utc::now(),
                });
                true
            }
            None => had_transport,
        }
    }

    fn transition(&self, inner: &mut ControllerInner, new_state: ConnectionState) {
        let old_state = inner.state;
        if old_state == new_state {
            return;
        }
        inner.state = new_state;
        info!(old = ?old_state, new = ?new_state, "Connection state changed");
        self.events.emit_lossy(FeedEvent::ConnectionStateChanged {
            old_state,
            new_state,
            timestamp: Utc::now(),
        });
    }
}

impl Drop for FeedController {
    fn drop(&mut self) {
        if let Some(session) = &self.inner.get_mut().session {
            session.close();
        }
    }
}
