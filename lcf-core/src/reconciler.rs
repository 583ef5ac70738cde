//! Comment reconciler
//!
//! Owns the accumulated comment set of one session and turns each incoming
//! batch into render instructions. Everything here is synchronous and free of
//! I/O; the session layer feeds batches in arrival order and performs the
//! customer fetches the outcome asks for.

use lcf_common::events::{
    DisplayComment, FeedCounts, PaginationView, RenderInstruction, TransportMode,
};
use lcf_common::model::{Comment, CustomerStatus, OrderInfo, DEFAULT_STATUS_LABEL};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

use crate::enrichment::EnrichmentCache;
use crate::pagination::{FetchWindow, PaginationController};
use crate::phone::{extract_phones, normalize_phone};
use crate::search::SearchQuery;

/// Comments delivered together by either transport
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub comments: Vec<Comment>,
    /// Server-reported total, when the transport carries one
    pub total_count: Option<u64>,
}

impl Batch {
    pub fn new(comments: Vec<Comment>) -> Self {
        Self {
            comments,
            total_count: None,
        }
    }

    pub fn with_total(comments: Vec<Comment>, total_count: Option<u64>) -> Self {
        Self {
            comments,
            total_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }
}

/// Everything one reconciler step wants the outside world to do
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub instructions: Vec<RenderInstruction>,
    pub counts: Option<FeedCounts>,
    pub pagination: Option<PaginationView>,
    /// Phones claimed for a customer fetch; each needs exactly one request
    pub phones_to_fetch: Vec<String>,
    /// Comments that just entered the "new" window
    pub fresh_ids: Vec<String>,
}

impl ReconcileOutcome {
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
            && self.counts.is_none()
            && self.pagination.is_none()
            && self.phones_to_fetch.is_empty()
            && self.fresh_ids.is_empty()
    }
}

/// Session-scoped reconciliation state
#[derive(Debug)]
pub struct SessionState {
    mode: TransportMode,
    /// Display order, top first
    comments: Vec<Comment>,
    known_ids: HashSet<String>,
    fresh_ids: HashSet<String>,
    /// Next batch replaces the view: set at session start and on page change
    first_load_pending: bool,
    search: Option<SearchQuery>,
    pagination: PaginationController,
    reported_total: Option<u64>,
    new_count: u64,
    enrichment: EnrichmentCache,
}

impl SessionState {
    pub fn new(mode: TransportMode, page_size: u32) -> Self {
        Self {
            mode,
            comments: Vec::new(),
            known_ids: HashSet::new(),
            fresh_ids: HashSet::new(),
            first_load_pending: true,
            search: None,
            pagination: PaginationController::new(page_size),
            reported_total: None,
            new_count: 0,
            enrichment: EnrichmentCache::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn comment_ids(&self) -> Vec<&str> {
        self.comments.iter().map(|c| c.id.as_str()).collect()
    }

    pub fn is_known(&self, id: &str) -> bool {
        self.known_ids.contains(id)
    }

    pub fn is_fresh(&self, id: &str) -> bool {
        self.fresh_ids.contains(id)
    }

    pub fn new_count(&self) -> u64 {
        self.new_count
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search.as_ref().map(SearchQuery::term)
    }

    pub fn pagination(&self) -> &PaginationController {
        &self.pagination
    }

    pub fn enrichment(&self) -> &EnrichmentCache {
        &self.enrichment
    }

    /// Window for the next poll fetch
    pub fn fetch_window(&self) -> FetchWindow {
        self.pagination.window()
    }

    /// Server total, or comments seen so far this session when upstream
    /// never reported one
    pub fn total_count(&self) -> u64 {
        self.reported_total.unwrap_or(self.known_ids.len() as u64)
    }

    pub fn counts(&self) -> FeedCounts {
        FeedCounts {
            total: self.total_count(),
            accumulated: self.comments.len(),
            new_count: self.new_count,
            filtered: self
                .search
                .as_ref()
                .map(|query| query.apply(&self.project_all()).len()),
        }
    }

    pub fn pagination_view(&self) -> PaginationView {
        self.pagination
            .view(self.mode.is_poll() && self.search.is_none())
    }

    // ------------------------------------------------------------------------
    // Batch reconciliation
    // ------------------------------------------------------------------------

    /// Merge one batch
    ///
    /// - empty batch: nothing happens
    /// - search active: merge silently, then redraw the filtered view
    /// - first batch: replace the view in batch order
    /// - otherwise: prepend unseen comments (last of the batch on top) and
    ///   flag them new
    pub fn reconcile(&mut self, batch: Batch) -> ReconcileOutcome {
        if batch.is_empty() {
            return ReconcileOutcome::default();
        }

        if let Some(total) = batch.total_count {
            self.reported_total = Some(total);
        }

        let mut outcome = ReconcileOutcome::default();

        if self.first_load_pending {
            self.first_load(batch.comments);
            if self.search.is_none() {
                outcome.instructions.push(RenderInstruction::ReplaceAll {
                    items: self.project_all(),
                });
            }
        } else {
            let added = self.merge_steady(batch.comments);
            self.new_count += added.len() as u64;

            // Comments merged during a search are settled: no "new" window
            if self.search.is_none() && !added.is_empty() {
                self.fresh_ids.extend(added.iter().cloned());
                let items: Vec<DisplayComment> = self.comments[..added.len()]
                    .iter()
                    .map(|c| self.project(c))
                    .collect();
                outcome.fresh_ids = added;
                outcome.instructions.push(RenderInstruction::PrependNew { items });
            }
        }

        if let Some(query) = &self.search {
            outcome.instructions.push(self.filtered_view(query));
        }

        self.pagination.set_total_count(self.total_count());
        outcome.phones_to_fetch = self.claim_displayed_phones();
        outcome.counts = Some(self.counts());
        outcome.pagination = Some(self.pagination_view());

        debug!(
            accumulated = self.comments.len(),
            new_count = self.new_count,
            instructions = outcome.instructions.len(),
            "Batch reconciled"
        );
        outcome
    }

    /// Ids already known from an earlier page are shown but never flagged
    fn first_load(&mut self, comments: Vec<Comment>) {
        self.first_load_pending = false;
        for comment in comments {
            self.known_ids.insert(comment.id.clone());
            match self.comments.iter_mut().find(|c| c.id == comment.id) {
                Some(slot) => *slot = comment,
                None => self.comments.push(comment),
            }
        }
    }

    /// Returns the ids of unseen comments, now sitting at the top of the list
    /// in display order
    fn merge_steady(&mut self, comments: Vec<Comment>) -> Vec<String> {
        let mut added: Vec<Comment> = Vec::new();

        for comment in comments {
            if self.known_ids.insert(comment.id.clone()) {
                added.push(comment);
            } else if let Some(pending) = added.iter_mut().find(|c| c.id == comment.id) {
                *pending = comment;
            } else {
                self.replace_stored(comment);
            }
        }

        added.reverse();
        let ids: Vec<String> = added.iter().map(|c| c.id.clone()).collect();
        added.append(&mut self.comments);
        self.comments = added;
        ids
    }

    /// Last write wins for a resent comment; its position is kept
    fn replace_stored(&mut self, comment: Comment) {
        if let Some(slot) = self.comments.iter_mut().find(|c| c.id == comment.id) {
            *slot = comment;
        }
    }

    // ------------------------------------------------------------------------
    // Control operations
    // ------------------------------------------------------------------------

    /// Enter, change or leave search mode
    ///
    /// Leaving redraws the full list and brings pagination back at the page
    /// it was on.
    pub fn set_search_term(&mut self, term: Option<&str>) -> ReconcileOutcome {
        let query = term.and_then(SearchQuery::new);
        let was_searching = self.search.is_some();

        if query.as_ref().map(SearchQuery::term) == self.search_term() {
            return ReconcileOutcome::default();
        }

        self.search = query;
        let mut outcome = ReconcileOutcome::default();

        match &self.search {
            Some(query) => outcome.instructions.push(self.filtered_view(query)),
            None if was_searching => outcome.instructions.push(RenderInstruction::ReplaceAll {
                items: self.project_all(),
            }),
            None => {}
        }

        outcome.phones_to_fetch = self.claim_displayed_phones();
        outcome.counts = Some(self.counts());
        outcome.pagination = Some(self.pagination_view());
        outcome
    }

    /// Navigate in poll mode
    ///
    /// On a real page change the displayed list is dropped so the next fetch
    /// lands as a first load. Known ids stay for the whole session. The
    /// returned window must be fetched immediately.
    pub fn go_to_page(&mut self, requested: i64) -> Option<(FetchWindow, ReconcileOutcome)> {
        if !self.mode.is_poll() || self.search.is_some() {
            debug!(requested, "Page navigation ignored outside paginated view");
            return None;
        }

        let window = self.pagination.navigate(requested)?;

        self.comments.clear();
        self.fresh_ids.clear();
        self.first_load_pending = true;

        let outcome = ReconcileOutcome {
            instructions: vec![RenderInstruction::ResetScroll],
            pagination: Some(self.pagination_view()),
            ..Default::default()
        };
        Some((window, outcome))
    }

    /// End the "new" window for `ids`
    pub fn clear_new_flags(&mut self, ids: &[String]) -> ReconcileOutcome {
        let cleared: Vec<String> = ids
            .iter()
            .filter(|id| self.fresh_ids.remove(id.as_str()))
            .cloned()
            .collect();

        let mut outcome = ReconcileOutcome::default();
        if !cleared.is_empty() && self.search.is_none() {
            outcome
                .instructions
                .push(RenderInstruction::ClearNewFlags { ids: cleared });
        }
        outcome
    }

    /// Bulk-replace the order map and redraw
    pub fn replace_orders(&mut self, records: Vec<OrderInfo>) -> ReconcileOutcome {
        self.enrichment.replace_orders(records);

        let mut outcome = ReconcileOutcome::default();
        if self.first_load_pending {
            // Nothing displayed yet
            return outcome;
        }

        let instruction = match &self.search {
            Some(query) => self.filtered_view(query),
            None => RenderInstruction::ReplaceAll {
                items: self.project_all(),
            },
        };
        outcome.instructions.push(instruction);
        outcome.phones_to_fetch = self.claim_displayed_phones();
        outcome
    }

    pub fn order_count(&self) -> usize {
        self.enrichment.order_count()
    }

    /// Store a successful customer lookup (`None` is the "unknown" sentinel)
    /// and redraw affected comments
    pub fn apply_customer_status(
        &mut self,
        phone: &str,
        status: Option<CustomerStatus>,
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        if self.enrichment.customers_mut().complete(phone, status).is_none() {
            return outcome;
        }

        if let Some(query) = &self.search {
            outcome.instructions.push(self.filtered_view(query));
            return outcome;
        }

        let items: Vec<DisplayComment> = self
            .comments
            .iter()
            .map(|c| self.project(c))
            .filter(|d| d.phones.iter().any(|p| p == phone))
            .collect();
        if !items.is_empty() {
            outcome
                .instructions
                .push(RenderInstruction::UpdateItems { items });
        }
        outcome
    }

    /// A customer lookup failed; the comment keeps its default label
    pub fn customer_lookup_failed(&mut self, phone: &str) {
        self.enrichment.customers_mut().fail(phone);
    }

    // ------------------------------------------------------------------------
    // Projection
    // ------------------------------------------------------------------------

    /// Attach enrichment to one comment
    pub fn project(&self, comment: &Comment) -> DisplayComment {
        let order = self
            .enrichment
            .get_order_info(&comment.id, &comment.author_id)
            .cloned();
        let phones = comment_phones(comment, order.as_ref());
        let customer = self.enrichment.customer_for(&phones).cloned();
        let status_label = customer
            .as_ref()
            .map(|c| c.label().to_string())
            .unwrap_or_else(|| DEFAULT_STATUS_LABEL.to_string());

        DisplayComment {
            is_new: self.fresh_ids.contains(&comment.id),
            comment: comment.clone(),
            order,
            phones: phones.into_iter().collect(),
            customer,
            status_label,
        }
    }

    pub fn project_all(&self) -> Vec<DisplayComment> {
        self.comments.iter().map(|c| self.project(c)).collect()
    }

    fn filtered_view(&self, query: &SearchQuery) -> RenderInstruction {
        let all = self.project_all();
        let items = query.apply(&all);
        RenderInstruction::FilteredReplace {
            matched: items.len(),
            total: all.len(),
            items,
        }
    }

    /// Claim customer fetches for every phone on screen
    fn claim_displayed_phones(&mut self) -> Vec<String> {
        let displayed = self.project_all();
        let displayed: Vec<DisplayComment> = match &self.search {
            Some(query) => query
                .apply(&displayed)
                .into_iter()
                .map(|hit| hit.display)
                .collect(),
            None => displayed,
        };

        let phones: BTreeSet<String> = displayed
            .into_iter()
            .flat_map(|d| d.phones)
            .collect();
        self.enrichment.ensure_customer_status(&phones)
    }
}

/// Phones in the comment text plus the linked order's telephone
pub fn comment_phones(comment: &Comment, order: Option<&OrderInfo>) -> BTreeSet<String> {
    let mut phones = extract_phones(Some(&comment.text));
    if let Some(phone) = order
        .and_then(|o| o.telephone.as_deref())
        .and_then(normalize_phone)
    {
        phones.insert(phone);
    }
    phones
}
