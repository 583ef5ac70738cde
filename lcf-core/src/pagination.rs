//! Pagination for poll mode
//!
//! Maps the current page to a fetch window and derives the page count from the
//! server-reported total. Only consulted while polling with no search term.

use lcf_common::events::PaginationView;
use serde::{Deserialize, Serialize};

/// Pagination metadata calculated from total results and requested page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: u32,
    /// Total number of pages
    pub total_pages: u32,
    /// Offset for the pull request
    pub offset: u64,
}

/// Calculate pagination metadata from total results and requested page
///
/// Ensures page is within valid bounds [1, total_pages]
///
/// # Examples
/// ```
/// use lcf_core::pagination::calculate_pagination;
///
/// let p = calculate_pagination(95, 10, 50);
/// assert_eq!(p.page, 2);
/// assert_eq!(p.total_pages, 2);
/// assert_eq!(p.offset, 50);
/// ```
pub fn calculate_pagination(total_results: u64, requested_page: i64, page_size: u32) -> Pagination {
    let page_size = page_size.max(1) as u64;
    let total_pages = total_results.div_ceil(page_size).min(u32::MAX as u64) as u32;
    let page = requested_page.clamp(1, total_pages.max(1) as i64) as u32;
    let offset = (page as u64 - 1) * page_size;

    Pagination {
        page,
        total_pages,
        offset,
    }
}

/// Window handed to the pull endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchWindow {
    pub page: u32,
    pub limit: u32,
    pub offset: u64,
}

/// Page state of one session
///
/// Survives search mode untouched so clearing the term returns to the same
/// page.
#[derive(Debug, Clone)]
pub struct PaginationController {
    current_page: u32,
    page_size: u32,
    total_count: u64,
}

impl PaginationController {
    pub fn new(page_size: u32) -> Self {
        Self {
            current_page: 1,
            page_size: page_size.max(1),
            total_count: 0,
        }
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn set_total_count(&mut self, total: u64) {
        self.total_count = total;
    }

    pub fn total_pages(&self) -> u32 {
        calculate_pagination(self.total_count, 1, self.page_size).total_pages
    }

    /// Fetch window for the current page
    pub fn window(&self) -> FetchWindow {
        FetchWindow {
            page: self.current_page,
            limit: self.page_size,
            offset: (self.current_page as u64 - 1) * self.page_size as u64,
        }
    }

    /// Move to `requested`, clamped into the valid range
    ///
    /// Returns the window to fetch, or `None` when the clamped page equals the
    /// current one.
    pub fn navigate(&mut self, requested: i64) -> Option<FetchWindow> {
        let target = calculate_pagination(self.total_count, requested, self.page_size).page;
        if target == self.current_page {
            return None;
        }
        self.current_page = target;
        Some(self.window())
    }

    /// Control state; `allowed` is false in stream mode or while searching
    pub fn view(&self, allowed: bool) -> PaginationView {
        let total_pages = self.total_pages();
        PaginationView {
            visible: allowed && total_pages > 1,
            current_page: self.current_page,
            total_pages,
            prev_enabled: self.current_page > 1,
            next_enabled: self.current_page < total_pages,
        }
    }
}
