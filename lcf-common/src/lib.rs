//! # LCF Common Library
//!
//! Shared code for the live comment feed crates including:
//! - Upstream data model (comments, order records, customer status)
//! - Event types (FeedEvent enum) and the broadcast EventBus
//! - Configuration loading
//! - Utility functions

pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod time;

pub use error::{Error, Result};
