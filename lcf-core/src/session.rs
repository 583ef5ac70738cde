//! Session context
//!
//! One `FeedSession` exists per started (page, post) target. It owns the
//! reconciliation state behind a single async mutex, so batches, enrichment
//! results and control operations are applied one at a time, and it turns
//! every reconciler outcome into bus events and follow-up tasks (customer
//! fetches, "new" flag expiry).
//!
//! Every task spawned on behalf of a session checks the session's
//! cancellation token after its await point and before touching state.

use chrono::Utc;
use lcf_common::events::{ErrorKind, EventBus, FeedCounts, FeedEvent, TransportMode};
use lcf_common::model::FeedTarget;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::pagination::FetchWindow;
use crate::reconciler::{Batch, ReconcileOutcome, SessionState};
use crate::sources::Sources;

/// Timing knobs a session needs
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub page_size: u32,
    pub new_flag_duration: Duration,
    pub reconnect_delay: Duration,
}

/// Live state of one target
pub struct FeedSession {
    id: Uuid,
    target: FeedTarget,
    mode: TransportMode,
    credential: String,
    settings: SessionSettings,
    sources: Sources,
    events: EventBus,
    cancel: CancellationToken,
    error_shown: AtomicBool,
    state: Mutex<SessionState>,
}

impl FeedSession {
    pub fn new(
        target: FeedTarget,
        mode: TransportMode,
        credential: String,
        settings: SessionSettings,
        sources: Sources,
        events: EventBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            state: Mutex::new(SessionState::new(mode, settings.page_size)),
            target,
            mode,
            credential,
            settings,
            sources,
            events,
            cancel: CancellationToken::new(),
            error_shown: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn target(&self) -> &FeedTarget {
        &self.target
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    pub fn sources(&self) -> &Sources {
        &self.sources
    }

    /// Token cancelled when the session is torn down
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_live(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Mark the session dead; late results are dropped from here on
    pub fn close(&self) {
        self.cancel.cancel();
    }

    // ------------------------------------------------------------------------
    // Batches
    // ------------------------------------------------------------------------

    /// Merge one batch in arrival order
    pub async fn ingest(self: &Arc<Self>, batch: Batch) {
        let mut state = self.state.lock().await;
        if !self.is_live() {
            debug!(session_id = %self.id, "Dropping batch for closed session");
            return;
        }
        let outcome = state.reconcile(batch);
        self.publish(outcome);
    }

    /// Merge a poll result only if it still belongs to the current page
    pub async fn ingest_window(self: &Arc<Self>, batch: Batch, window: FetchWindow) {
        let mut state = self.state.lock().await;
        if !self.is_live() {
            return;
        }
        if state.fetch_window() != window {
            debug!(
                session_id = %self.id,
                page = window.page,
                "Dropping poll result for a page no longer shown"
            );
            return;
        }
        let outcome = state.reconcile(batch);
        self.publish(outcome);
    }

    // ------------------------------------------------------------------------
    // Control
    // ------------------------------------------------------------------------

    pub async fn set_search_term(self: &Arc<Self>, term: Option<&str>) {
        let mut state = self.state.lock().await;
        let outcome = state.set_search_term(term);
        self.publish(outcome);
    }

    /// Returns the window to fetch right away, if the page changed
    pub async fn go_to_page(self: &Arc<Self>, page: i64) -> Option<FetchWindow> {
        let mut state = self.state.lock().await;
        let (window, outcome) = state.go_to_page(page)?;
        self.publish(outcome);
        Some(window)
    }

    pub async fn fetch_window(&self) -> FetchWindow {
        self.state.lock().await.fetch_window()
    }

    pub async fn comment_ids(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.comment_ids().into_iter().map(str::to_string).collect()
    }

    pub async fn counts(&self) -> FeedCounts {
        self.state.lock().await.counts()
    }

    // ------------------------------------------------------------------------
    // Enrichment
    // ------------------------------------------------------------------------

    /// Fetch the order list and swap it in
    ///
    /// Failures are logged and reported as `Error::Enrichment`; displayed
    /// comments keep their previous enrichment.
    pub async fn load_orders(self: &Arc<Self>, force_refresh: bool) -> Result<usize> {
        let fetch = self.sources.orders.fetch_orders(
            &self.target.post_id,
            force_refresh,
            &self.credential,
        );
        let records = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(0),
            result = fetch => result,
        };

        let records = match records {
            Ok(records) => records,
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Order lookup failed");
                return Err(Error::Enrichment(e.to_string()));
            }
        };

        let mut state = self.state.lock().await;
        if !self.is_live() {
            return Ok(0);
        }

        let order_count = records.len();
        let outcome = state.replace_orders(records);
        info!(session_id = %self.id, order_count, force_refresh, "Orders replaced");
        self.events.emit_lossy(FeedEvent::OrdersReplaced {
            session_id: self.id,
            order_count,
        });
        self.publish(outcome);
        Ok(order_count)
    }

    fn spawn_customer_fetch(self: &Arc<Self>, phone: String) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let fetch = session
                .sources
                .customers
                .fetch_customer(&phone, &session.credential);
            let result = tokio::select! {
                _ = session.cancel.cancelled() => return,
                result = fetch => result,
            };

            let mut state = session.state.lock().await;
            if !session.is_live() {
                return;
            }

            match result {
                Ok(status) => {
                    if let Some(status) = &status {
                        session.events.emit_lossy(FeedEvent::CustomerStatusUpdated {
                            session_id: session.id,
                            phone: phone.clone(),
                            status: status.clone(),
                        });
                    }
                    let outcome = state.apply_customer_status(&phone, status);
                    session.publish(outcome);
                }
                Err(e) => {
                    warn!(session_id = %session.id, phone = %phone, error = %e, "Customer lookup failed");
                    state.customer_lookup_failed(&phone);
                }
            }
        });
    }

    fn schedule_flag_clear(self: &Arc<Self>, ids: Vec<String>) {
        let session = Arc::clone(self);
        let delay = self.settings.new_flag_duration;
        tokio::spawn(async move {
            tokio::select! {
                _ = session.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let mut state = session.state.lock().await;
            if !session.is_live() {
                return;
            }
            let outcome = state.clear_new_flags(&ids);
            session.publish(outcome);
        });
    }

    // ------------------------------------------------------------------------
    // Banner
    // ------------------------------------------------------------------------

    /// Show a transient transport error
    pub fn raise_transport_error(&self, message: impl Into<String>) {
        if !self.is_live() {
            return;
        }
        self.error_shown.store(true, Ordering::SeqCst);
        self.events.emit_lossy(FeedEvent::ErrorRaised {
            kind: ErrorKind::Transport,
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    /// Clear the banner after a successful open or tick
    pub fn clear_error(&self) {
        if self.error_shown.swap(false, Ordering::SeqCst) {
            self.events.emit_lossy(FeedEvent::ErrorCleared {
                timestamp: Utc::now(),
            });
        }
    }

    // ------------------------------------------------------------------------
    // Outcome dispatch
    // ------------------------------------------------------------------------

    /// Emit the outcome and start its follow-up work
    ///
    /// Called with the state lock held so events leave in the order the
    /// state changed.
    fn publish(self: &Arc<Self>, outcome: ReconcileOutcome) {
        if outcome.is_empty() {
            return;
        }

        for instruction in outcome.instructions {
            debug!(session_id = %self.id, kind = instruction.kind(), "Render");
            self.events.emit_lossy(FeedEvent::Render {
                session_id: self.id,
                instruction,
            });
        }

        if let Some(counts) = outcome.counts {
            self.events.emit_lossy(FeedEvent::CountsUpdated {
                session_id: self.id,
                counts,
            });
        }

        if let Some(pagination) = outcome.pagination {
            self.events.emit_lossy(FeedEvent::PaginationChanged {
                session_id: self.id,
                pagination,
            });
        }

        for phone in outcome.phones_to_fetch {
            self.spawn_customer_fetch(phone);
        }

        if !outcome.fresh_ids.is_empty() {
            self.schedule_flag_clear(outcome.fresh_ids);
        }
    }
}

impl std::fmt::Debug for FeedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSession")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("mode", &self.mode)
            .field("live", &self.is_live())
            .finish()
    }
}
