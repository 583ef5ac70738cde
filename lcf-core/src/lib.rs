//! lcf-core - Live comment feed engine
//!
//! Keeps a deduplicated, ordered, enriched view of the comments on one
//! social-media post while they arrive over a push stream or a polling loop.
//! Comments are joined with order records and customer status from the shop
//! backend, filtered by an accent-insensitive search term and paged in poll
//! mode. The display side consumes `FeedEvent`s from the `EventBus`.

pub mod connection;
pub mod controller;
pub mod enrichment;
pub mod error;
pub mod pagination;
pub mod phone;
pub mod reconciler;
pub mod search;
pub mod session;
pub mod sources;

pub use controller::FeedController;
pub use error::{Error, Result};
pub use reconciler::{Batch, ReconcileOutcome, SessionState};
pub use session::{FeedSession, SessionSettings};
pub use sources::{
    CommentSource, CredentialProvider, CustomerSource, HttpBackend, OrderSource, Sources,
    StaticCredential,
};
