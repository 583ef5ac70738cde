//! HTTP backend
//!
//! reqwest clients serving the push endpoint (server-sent events), the
//! pull endpoint, the order endpoint and the customer endpoint of the shop
//! proxy.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use lcf_common::config::FeedConfig;
use lcf_common::model::{CommentPage, CustomerStatus, FeedTarget, OrderInfo};
use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::{CommentSource, CustomerSource, MessageStream, OrderSource};
use crate::error::{Error, Result};
use crate::pagination::FetchWindow;

const USER_AGENT: &str = concat!("lcf-core/", env!("CARGO_PKG_VERSION"));

/// reqwest implementation of every source trait
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http_client: reqwest::Client,
    stream_client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()?;

        // The push connection is long-lived; only bound the connect phase
        let stream_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(request_timeout)
            .build()?;

        Ok(Self {
            http_client,
            stream_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &FeedConfig) -> Result<Self> {
        Self::new(config.base_url.clone(), config.request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        credential: &str,
    ) -> Result<T> {
        let url = self.url(path);
        debug!(url = %url, "GET");

        let response = self
            .http_client
            .get(&url)
            .query(query)
            .bearer_auth(credential)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::UpstreamStatus {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl CommentSource for HttpBackend {
    async fn open_stream(&self, target: &FeedTarget, credential: &str) -> Result<MessageStream> {
        let url = self.url("/api/comments/stream");
        debug!(url = %url, target = %target, "Opening comment stream");

        let response = self
            .stream_client
            .get(&url)
            .query(&[
                ("pageId", target.page_id.as_str()),
                ("postId", target.post_id.as_str()),
            ])
            .bearer_auth(credential)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| Error::Transport(format!("stream request failed: {}", e)))?;

        let response = ensure_success(response).await?;

        // Heartbeat comments never surface; events without data are skipped
        let messages = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| async move {
                match event {
                    Ok(event) if event.data.is_empty() => None,
                    Ok(event) => Some(Ok(event.data)),
                    Err(e) => Some(Err(Error::Transport(format!("stream read failed: {}", e)))),
                }
            });

        Ok(Box::pin(messages))
    }

    async fn fetch_page(
        &self,
        target: &FeedTarget,
        window: FetchWindow,
        credential: &str,
    ) -> Result<CommentPage> {
        self.get_json(
            "/api/comments",
            &[
                ("pageId", target.page_id.clone()),
                ("postId", target.post_id.clone()),
                ("limit", window.limit.to_string()),
                ("offset", window.offset.to_string()),
            ],
            credential,
        )
        .await
    }
}

#[async_trait]
impl OrderSource for HttpBackend {
    async fn fetch_orders(
        &self,
        post_id: &str,
        force_refresh: bool,
        credential: &str,
    ) -> Result<Vec<OrderInfo>> {
        let mut query = vec![("postId", post_id.to_string())];
        if force_refresh {
            query.push(("force", "true".to_string()));
        }
        self.get_json("/api/orders", &query, credential).await
    }
}

#[async_trait]
impl CustomerSource for HttpBackend {
    async fn fetch_customer(&self, phone: &str, credential: &str) -> Result<Option<CustomerStatus>> {
        let url = self.url(&format!("/api/customers/{}", phone));
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(credential)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = ensure_success(response).await?;
        // `null` body is the unknown-customer sentinel
        Ok(response.json::<Option<CustomerStatus>>().await?)
    }
}
