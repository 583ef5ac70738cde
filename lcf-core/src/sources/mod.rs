//! External collaborators
//!
//! The engine reaches the comment, order and customer backends and the
//! credential holder only through these traits. `http` holds the reqwest
//! implementation; tests plug in in-memory fakes.

pub mod http;

use async_trait::async_trait;
use futures::stream::BoxStream;
use lcf_common::model::{CommentPage, CustomerStatus, FeedTarget, OrderInfo};
use std::sync::Arc;

use crate::error::Result;
use crate::pagination::FetchWindow;

pub use http::HttpBackend;

/// Raw push messages; each item is one message payload (JSON text)
pub type MessageStream = BoxStream<'static, Result<String>>;

/// Where comments come from
#[async_trait]
pub trait CommentSource: Send + Sync {
    /// Open the push connection for `target`
    ///
    /// The returned stream ends or yields an error when the connection drops.
    async fn open_stream(&self, target: &FeedTarget, credential: &str) -> Result<MessageStream>;

    /// Pull one window of comments, newest first
    async fn fetch_page(
        &self,
        target: &FeedTarget,
        window: FetchWindow,
        credential: &str,
    ) -> Result<CommentPage>;
}

/// Order records for a post
#[async_trait]
pub trait OrderSource: Send + Sync {
    /// `force_refresh` bypasses upstream caching
    async fn fetch_orders(
        &self,
        post_id: &str,
        force_refresh: bool,
        credential: &str,
    ) -> Result<Vec<OrderInfo>>;
}

/// Customer status by phone
#[async_trait]
pub trait CustomerSource: Send + Sync {
    /// `Ok(None)` is the backend's "unknown customer" answer
    async fn fetch_customer(&self, phone: &str, credential: &str) -> Result<Option<CustomerStatus>>;
}

/// Supplies the bearer token
pub trait CredentialProvider: Send + Sync {
    fn credential(&self) -> Option<String>;
}

/// Fixed token, typically resolved from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticCredential(Option<String>);

impl StaticCredential {
    pub fn new(token: Option<String>) -> Self {
        Self(token)
    }
}

impl CredentialProvider for StaticCredential {
    fn credential(&self) -> Option<String> {
        self.0.clone()
    }
}

/// The full set of collaborators a controller needs
#[derive(Clone)]
pub struct Sources {
    pub comments: Arc<dyn CommentSource>,
    pub orders: Arc<dyn OrderSource>,
    pub customers: Arc<dyn CustomerSource>,
    pub credentials: Arc<dyn CredentialProvider>,
}

impl Sources {
    /// One backend serving all three endpoints
    pub fn from_backend<B>(backend: Arc<B>, credentials: Arc<dyn CredentialProvider>) -> Self
    where
        B: CommentSource + OrderSource + CustomerSource + 'static,
    {
        Self {
            comments: backend.clone(),
            orders: backend.clone(),
            customers: backend,
            credentials,
        }
    }

    /// Current non-blank credential
    pub fn credential(&self) -> Option<String> {
        self.credentials
            .credential()
            .filter(|token| !token.trim().is_empty())
    }
}
