//! Pull transport
//!
//! Fetches the current page window on a fixed interval. A failed tick shows a
//! transient error and leaves the timer running; the next successful tick
//! clears it. Page changes arrive on a channel and are fetched at once.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pagination::FetchWindow;
use crate::reconciler::Batch;
use crate::session::FeedSession;

/// Transport task: first fetch immediately, then once per `period`
pub async fn run(
    session: Arc<FeedSession>,
    cancel: CancellationToken,
    period: Duration,
    mut fetch_rx: mpsc::UnboundedReceiver<FetchWindow>,
) {
    info!(
        session_id = %session.id(),
        target = %session.target(),
        interval_secs = period.as_secs(),
        "Poll transport started"
    );

    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let window = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = timer.tick() => session.fetch_window().await,
            Some(window) = fetch_rx.recv() => {
                // Manual fetch stands in for the next tick
                timer.reset();
                window
            }
        };

        poll_once(&session, &cancel, window).await;
    }

    debug!(session_id = %session.id(), "Poll transport stopped");
}

async fn poll_once(session: &Arc<FeedSession>, cancel: &CancellationToken, window: FetchWindow) {
    let fetch = session
        .sources()
        .comments
        .fetch_page(session.target(), window, session.credential());

    let result = tokio::select! {
        _ = cancel.cancelled() => return,
        result = fetch => result,
    };

    match result {
        Ok(page) => {
            session.clear_error();
            debug!(
                session_id = %session.id(),
                page = window.page,
                size = page.data.len(),
                total = ?page.total_count,
                "Poll tick"
            );
            session
                .ingest_window(Batch::with_total(page.data, page.total_count), window)
                .await;
        }
        Err(e) => {
            warn!(session_id = %session.id(), page = window.page, error = %e, "Poll fetch failed");
            session.raise_transport_error(e.to_string());
        }
    }
}
