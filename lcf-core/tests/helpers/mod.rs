//! Shared test helpers: in-memory backend and event waiting

#![allow(dead_code)]

use async_trait::async_trait;
use lcf_common::config::FeedConfig;
use lcf_common::events::{EventBus, FeedEvent};
use lcf_common::model::{CommentPage, CustomerStatus, FeedTarget, OrderInfo};
use lcf_core::error::{Error, Result};
use lcf_core::pagination::FetchWindow;
use lcf_core::sources::{
    CommentSource, CustomerSource, MessageStream, OrderSource, Sources, StaticCredential,
};
use lcf_core::FeedController;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

pub const WAIT: Duration = Duration::from_secs(5);

/// Comment JSON in the flat proxy shape
pub fn comment_json(id: &str, author: &str, text: &str) -> serde_json::Value {
    json!({
        "id": id,
        "authorId": format!("u-{}", id),
        "authorName": author,
        "text": text,
        "createdAt": "2024-05-01T10:00:00Z",
    })
}

pub fn batch_message(comments: &[serde_json::Value]) -> String {
    serde_json::Value::Array(comments.to_vec()).to_string()
}

pub fn target() -> FeedTarget {
    FeedTarget::new("page-1", "post-1")
}

pub fn test_config() -> FeedConfig {
    FeedConfig {
        reconnect_delay: Duration::from_millis(50),
        new_flag_duration: Duration::from_millis(100),
        page_size: 50,
        ..FeedConfig::default()
    }
}

/// Decrements the active-stream counter when the stream is dropped
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory stand-in for the shop proxy
#[derive(Default)]
pub struct FakeBackend {
    stream_senders: Mutex<Vec<mpsc::UnboundedSender<Result<String>>>>,
    pub open_count: AtomicUsize,
    pub active_streams: Arc<AtomicUsize>,
    pub max_active_streams: AtomicUsize,
    pub fail_opens: AtomicUsize,

    pages: Mutex<HashMap<u64, CommentPage>>,
    pub page_requests: Mutex<Vec<FetchWindow>>,
    pub fail_polls: AtomicBool,

    orders: Mutex<Vec<OrderInfo>>,
    pub fail_orders: AtomicBool,
    pub order_requests: Mutex<Vec<bool>>,

    customers: Mutex<HashMap<String, CustomerStatus>>,
    pub customer_requests: Mutex<HashMap<String, usize>>,
    pub customer_delay: Mutex<Duration>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Push one raw message on the most recent stream
    pub fn push(&self, message: impl Into<String>) -> bool {
        let senders = self.stream_senders.lock().unwrap();
        match senders.last() {
            Some(tx) => tx.send(Ok(message.into())).is_ok(),
            None => false,
        }
    }

    /// End every open stream as if the server hung up
    pub fn drop_streams(&self) {
        self.stream_senders.lock().unwrap().clear();
    }

    pub fn set_page(&self, offset: u64, page: CommentPage) {
        self.pages.lock().unwrap().insert(offset, page);
    }

    pub fn set_orders(&self, orders: Vec<OrderInfo>) {
        *self.orders.lock().unwrap() = orders;
    }

    pub fn set_customer(&self, phone: &str, status: CustomerStatus) {
        self.customers
            .lock()
            .unwrap()
            .insert(phone.to_string(), status);
    }

    pub fn set_customer_delay(&self, delay: Duration) {
        *self.customer_delay.lock().unwrap() = delay;
    }

    pub fn customer_calls(&self, phone: &str) -> usize {
        self.customer_requests
            .lock()
            .unwrap()
            .get(phone)
            .copied()
            .unwrap_or(0)
    }

    pub fn requested_offsets(&self) -> Vec<u64> {
        self.page_requests
            .lock()
            .unwrap()
            .iter()
            .map(|w| w.offset)
            .collect()
    }
}

#[async_trait]
impl CommentSource for FakeBackend {
    async fn open_stream(&self, _target: &FeedTarget, _credential: &str) -> Result<MessageStream> {
        self.open_count.fetch_add(1, Ordering::SeqCst);

        if self
            .fail_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::Transport("connection refused".to_string()));
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        self.stream_senders.lock().unwrap().push(tx);

        let active = self.active_streams.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_streams.fetch_max(active, Ordering::SeqCst);
        let guard = ActiveGuard(Arc::clone(&self.active_streams));

        let stream = async_stream::stream! {
            let _guard = guard;
            while let Some(item) = rx.recv().await {
                yield item;
            }
        };
        Ok(Box::pin(stream))
    }

    async fn fetch_page(
        &self,
        _target: &FeedTarget,
        window: FetchWindow,
        _credential: &str,
    ) -> Result<CommentPage> {
        self.page_requests.lock().unwrap().push(window);
        if self.fail_polls.load(Ordering::SeqCst) {
            return Err(Error::UpstreamStatus {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(&window.offset)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl OrderSource for FakeBackend {
    async fn fetch_orders(
        &self,
        _post_id: &str,
        force_refresh: bool,
        _credential: &str,
    ) -> Result<Vec<OrderInfo>> {
        self.order_requests.lock().unwrap().push(force_refresh);
        if self.fail_orders.load(Ordering::SeqCst) {
            return Err(Error::Transport("orders down".to_string()));
        }
        Ok(self.orders.lock().unwrap().clone())
    }
}

#[async_trait]
impl CustomerSource for FakeBackend {
    async fn fetch_customer(&self, phone: &str, _credential: &str) -> Result<Option<CustomerStatus>> {
        *self
            .customer_requests
            .lock()
            .unwrap()
            .entry(phone.to_string())
            .or_insert(0) += 1;

        let delay = *self.customer_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.customers.lock().unwrap().get(phone).cloned())
    }
}

pub fn sources(backend: &Arc<FakeBackend>, token: Option<&str>) -> Sources {
    Sources::from_backend(
        Arc::clone(backend),
        Arc::new(StaticCredential::new(token.map(str::to_string))),
    )
}

pub fn controller(backend: &Arc<FakeBackend>, config: FeedConfig) -> FeedController {
    FeedController::new(config, sources(backend, Some("token")), EventBus::new(1000))
}

/// Receive events until `pick` returns `Some`, or panic after `WAIT`
pub async fn wait_for<T>(
    rx: &mut broadcast::Receiver<FeedEvent>,
    mut pick: impl FnMut(&FeedEvent) -> Option<T>,
) -> T {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let event = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event bus closed");
        if let Some(found) = pick(&event) {
            return found;
        }
    }
}

/// Collect every event that arrives within `window`
pub async fn drain_for(rx: &mut broadcast::Receiver<FeedEvent>, window: Duration) -> Vec<FeedEvent> {
    let deadline = tokio::time::Instant::now() + window;
    let mut events = Vec::new();
    while let Ok(Ok(event)) = tokio::time::timeout_at(deadline, rx.recv()).await {
        events.push(event);
    }
    events
}

/// Poll `check` until it holds, or panic after `WAIT`
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
