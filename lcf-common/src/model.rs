//! Upstream data model
//!
//! Comments come from the social platform, order records and customer status
//! from the commerce backend. Wire names follow each upstream's JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time;

/// Default customer status label shown while no lookup has succeeded
pub const DEFAULT_STATUS_LABEL: &str = "Normal";

// ============================================================================
// Comments
// ============================================================================

/// A single comment on the watched post
///
/// Immutable once received. Deserializes from both the flat proxy shape
/// (`authorId`, `authorName`, `text`, `createdAt`) and the Graph shape
/// (`from { id, name }`, `message`, `created_time`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireComment", rename_all = "camelCase")]
pub struct Comment {
    /// Globally unique id assigned by upstream
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireComment {
    id: String,
    #[serde(default)]
    author_id: Option<String>,
    #[serde(default)]
    author_name: Option<String>,
    #[serde(default)]
    from: Option<WireAuthor>,
    #[serde(default, alias = "message")]
    text: Option<String>,
    #[serde(default, alias = "created_time")]
    created_at: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
struct WireAuthor {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl From<WireComment> for Comment {
    fn from(wire: WireComment) -> Self {
        let (from_id, from_name) = match wire.from {
            Some(author) => (author.id, author.name),
            None => (None, None),
        };

        Comment {
            id: wire.id,
            author_id: wire.author_id.or(from_id).unwrap_or_default(),
            author_name: wire.author_name.or(from_name).unwrap_or_default(),
            text: wire.text.unwrap_or_default(),
            created_at: wire
                .created_at
                .as_deref()
                .and_then(time::parse_upstream_timestamp)
                .unwrap_or_else(time::now),
            avatar_url: wire.avatar_url.filter(|url| !url.is_empty()),
        }
    }
}

/// One page of comments returned by the pull endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPage {
    #[serde(default)]
    pub data: Vec<Comment>,
    /// Server-reported total across all pages, when upstream knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

// ============================================================================
// Commerce backend
// ============================================================================

/// Order record linked to a comment or to its author
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderInfo {
    #[serde(rename = "Facebook_CommentId", default)]
    pub comment_id: Option<String>,
    #[serde(rename = "Facebook_ASUserId", default)]
    pub author_id: Option<String>,
    /// Ordinal within the live session, shown as a badge
    #[serde(rename = "SessionIndex", default)]
    pub session_index: Option<i64>,
    #[serde(rename = "PrintCount", default)]
    pub print_count: i64,
    #[serde(rename = "Telephone", default)]
    pub telephone: Option<String>,
    #[serde(rename = "PartnerStatus", default)]
    pub partner_status: Option<String>,
    #[serde(rename = "PartnerName", default)]
    pub partner_name: Option<String>,
    #[serde(rename = "Address", default)]
    pub address: Option<String>,
    #[serde(rename = "Note", default)]
    pub note: Option<String>,
    #[serde(rename = "Code", default)]
    pub code: Option<String>,
}

/// Customer record looked up by phone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomerStatus {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub credit: Option<f64>,
    #[serde(default)]
    pub status_text: Option<String>,
}

impl CustomerStatus {
    /// Label shown next to the comment
    pub fn label(&self) -> &str {
        match self.status_text.as_deref() {
            Some(text) if !text.trim().is_empty() => text,
            _ => DEFAULT_STATUS_LABEL,
        }
    }
}

// ============================================================================
// Targets
// ============================================================================

/// The (page, post) pair a session watches
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedTarget {
    pub page_id: String,
    pub post_id: String,
}

impl FeedTarget {
    pub fn new(page_id: impl Into<String>, post_id: impl Into<String>) -> Self {
        Self {
            page_id: page_id.into(),
            post_id: post_id.into(),
        }
    }

    /// Both identifiers present
    pub fn is_complete(&self) -> bool {
        !self.page_id.trim().is_empty() && !self.post_id.trim().is_empty()
    }
}

impl std::fmt::Display for FeedTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.page_id, self.post_id)
    }
}
