//! Enrichment cache
//!
//! Holds the order records (dual-keyed by comment id and author id) and the
//! per-phone customer status for one session. Network access happens in the
//! session layer; this module only decides what to fetch and stores results.

use lcf_common::model::{CustomerStatus, OrderInfo};
use std::collections::{HashMap, HashSet};
use tracing::debug;

// ============================================================================
// Orders
// ============================================================================

/// Order records with two alias indices
///
/// Lookup precedence: the comment-id index first, then the author-id index.
/// Within one `replace` batch a later record with the same comment id takes
/// that key, while an author id stays bound to the first record that claimed
/// it.
#[derive(Debug, Default)]
pub struct OrderIndex {
    records: Vec<OrderInfo>,
    by_comment: HashMap<String, usize>,
    by_author: HashMap<String, usize>,
}

impl OrderIndex {
    /// Rebuild from a full record list
    ///
    /// The new index is built aside and swapped in, so no stale entry from the
    /// previous generation survives.
    pub fn replace(&mut self, records: Vec<OrderInfo>) {
        let mut by_comment = HashMap::new();
        let mut by_author = HashMap::new();

        for (idx, record) in records.iter().enumerate() {
            if let Some(comment_id) = non_blank(record.comment_id.as_deref()) {
                by_comment.insert(comment_id.to_string(), idx);
            }
            if let Some(author_id) = non_blank(record.author_id.as_deref()) {
                if by_author.contains_key(author_id) {
                    debug!(author_id, "Author already bound to an earlier order, skipping alias");
                } else {
                    by_author.insert(author_id.to_string(), idx);
                }
            }
        }

        *self = OrderIndex {
            records,
            by_comment,
            by_author,
        };
    }

    /// Look up by comment id, falling back to author id
    pub fn get(&self, comment_id: &str, author_id: &str) -> Option<&OrderInfo> {
        self.by_comment
            .get(comment_id)
            .or_else(|| self.by_author.get(author_id))
            .and_then(|&idx| self.records.get(idx))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// ============================================================================
// Customers
// ============================================================================

/// Cached outcome of a customer lookup
#[derive(Debug, Clone, PartialEq)]
pub enum CustomerEntry {
    Known(CustomerStatus),
    /// Backend answered with its "unknown customer" sentinel
    Unknown,
}

/// Per-phone customer status with in-flight tracking
#[derive(Debug, Default)]
pub struct CustomerCache {
    entries: HashMap<String, CustomerEntry>,
    in_flight: HashSet<String>,
}

impl CustomerCache {
    /// Reserve every phone that is neither cached nor already being fetched
    ///
    /// Returned phones are marked in flight; the caller must issue exactly one
    /// fetch for each and report back through `complete` or `fail`.
    pub fn claim<'a, I>(&mut self, phones: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut claimed = Vec::new();
        for phone in phones {
            if self.entries.contains_key(phone) || self.in_flight.contains(phone) {
                continue;
            }
            self.in_flight.insert(phone.clone());
            claimed.push(phone.clone());
        }
        claimed
    }

    /// Store a lookup answer. Returns the status when it is displayable.
    pub fn complete(&mut self, phone: &str, status: Option<CustomerStatus>) -> Option<CustomerStatus> {
        self.in_flight.remove(phone);
        match status {
            Some(status) => {
                self.entries
                    .insert(phone.to_string(), CustomerEntry::Known(status.clone()));
                Some(status)
            }
            None => {
                self.entries.insert(phone.to_string(), CustomerEntry::Unknown);
                None
            }
        }
    }

    /// Release a phone whose lookup failed; it stays unset and may be claimed
    /// again on a later render pass.
    pub fn fail(&mut self, phone: &str) {
        self.in_flight.remove(phone);
    }

    pub fn status(&self, phone: &str) -> Option<&CustomerStatus> {
        match self.entries.get(phone) {
            Some(CustomerEntry::Known(status)) => Some(status),
            _ => None,
        }
    }

    pub fn entry(&self, phone: &str) -> Option<&CustomerEntry> {
        self.entries.get(phone)
    }

    pub fn is_in_flight(&self, phone: &str) -> bool {
        self.in_flight.contains(phone)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

// ============================================================================
// Facade
// ============================================================================

/// Both enrichment maps of a session
#[derive(Debug, Default)]
pub struct EnrichmentCache {
    orders: OrderIndex,
    customers: CustomerCache,
}

impl EnrichmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_order_info(&self, comment_id: &str, author_id: &str) -> Option<&OrderInfo> {
        self.orders.get(comment_id, author_id)
    }

    pub fn replace_orders(&mut self, records: Vec<OrderInfo>) {
        self.orders.replace(records);
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Phones that need a fetch now (see [`CustomerCache::claim`])
    pub fn ensure_customer_status<'a, I>(&mut self, phones: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        self.customers.claim(phones)
    }

    pub fn customers_mut(&mut self) -> &mut CustomerCache {
        &mut self.customers
    }

    /// First known customer among `phones`
    pub fn customer_for<'a, I>(&self, phones: I) -> Option<&CustomerStatus>
    where
        I: IntoIterator<Item = &'a String>,
    {
        phones.into_iter().find_map(|p| self.customers.status(p))
    }
}
