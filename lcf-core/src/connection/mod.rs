//! Connection manager
//!
//! Opens exactly one transport for a session and hands back an owned handle.
//! Closing the handle cancels the transport task and waits for it to finish,
//! so no batch from an old transport can reach the session after `close`
//! returns.

pub mod poll;
pub mod stream;

use lcf_common::events::TransportMode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::pagination::FetchWindow;
use crate::session::FeedSession;

pub use stream::{parse_stream_message, StreamMessage};

/// Owned handle to the one running transport
#[derive(Debug)]
pub struct TransportHandle {
    mode: TransportMode,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    /// Immediate-fetch requests; poll mode only
    fetch_tx: Option<mpsc::UnboundedSender<FetchWindow>>,
}

impl TransportHandle {
    /// Spawn the transport matching `mode` for `session`
    pub fn open(session: Arc<FeedSession>, mode: TransportMode) -> Self {
        let cancel = session.cancellation().child_token();

        match mode {
            TransportMode::Stream => {
                let task = tokio::spawn(stream::run(session, cancel.clone()));
                Self {
                    mode,
                    cancel,
                    task: Some(task),
                    fetch_tx: None,
                }
            }
            TransportMode::Poll { interval_secs } => {
                let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();
                let interval = Duration::from_secs(interval_secs.max(1));
                let task = tokio::spawn(poll::run(session, cancel.clone(), interval, fetch_rx));
                Self {
                    mode,
                    cancel,
                    task: Some(task),
                    fetch_tx: Some(fetch_tx),
                }
            }
        }
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Ask the poller to fetch `window` now, outside its timer
    ///
    /// Returns `false` for the push transport or a closed poller.
    pub fn request_fetch(&self, window: FetchWindow) -> bool {
        match &self.fetch_tx {
            Some(tx) => tx.send(window).is_ok(),
            None => false,
        }
    }

    /// Cancel the transport and wait for its task to end
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(()) => debug!(mode = ?self.mode, "Transport closed"),
                Err(e) if e.is_cancelled() => debug!(mode = ?self.mode, "Transport aborted"),
                Err(e) => info!(mode = ?self.mode, error = %e, "Transport task ended abnormally"),
            }
        }
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
