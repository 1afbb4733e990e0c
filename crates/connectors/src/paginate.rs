//! Paginated fetch-retry-stream loop
//!
//! Drives a [`PageSource`] from the first page to the last, retrying each
//! page fetch under a [`RetryPolicy`] and handing items to a consumer one at a
//! time.
//!
//! # Design
//!
//! - One page is fetched and fully delivered before the next is requested
//! - Items are delivered in API order, never buffered beyond the current page
//! - The consumer stops the listing by returning [`Flow::Stop`]; a row budget
//!   stops it once enough items were delivered, even mid-page
//! - Page-token threading is an explicit [`PageCursor`] state machine

use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::error::ConnectorError;
use crate::resilience::{RetryPolicy, execute_with_retry};
use crate::traits::PageSource;

/// Largest page the API serves
pub const API_MAX_PAGE_SIZE: u32 = 100;

/// Parameters for a single page fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Token from the previous page (None for the first page)
    pub token: Option<String>,
    /// Requested page size
    pub limit: u32,
}

/// One page of a listing
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    #[serde(default = "Vec::new", deserialize_with = "null_as_empty")]
    pub items: Vec<T>,
    #[serde(default)]
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_token: Option<String>) -> Self {
        Self { items, next_token }
    }

    /// A page with no continuation
    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, None)
    }
}

// The API sends `"items": null` for empty listings
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Position within a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// Nothing fetched yet
    Start,
    /// Continue with this token
    Next(String),
    /// No more pages
    Done,
}

impl PageCursor {
    /// Cursor after a page carrying `next_token` (absent or empty = done)
    pub fn after(next_token: Option<String>) -> Self {
        match next_token {
            Some(token) if !token.is_empty() => PageCursor::Next(token),
            _ => PageCursor::Done,
        }
    }

    /// Request for the page at this cursor, None once done
    pub fn request(&self, limit: u32) -> Option<PageRequest> {
        match self {
            PageCursor::Start => Some(PageRequest { token: None, limit }),
            PageCursor::Next(token) => Some(PageRequest {
                token: Some(token.clone()),
                limit,
            }),
            PageCursor::Done => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, PageCursor::Done)
    }
}

/// Consumer verdict after each delivered item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Optional ceiling on the number of items a consumer needs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowBudget {
    limit: Option<u64>,
}

impl RowBudget {
    /// No ceiling
    pub fn unlimited() -> Self {
        Self { limit: None }
    }

    pub fn limited(limit: u64) -> Self {
        Self { limit: Some(limit) }
    }

    pub fn from_limit(limit: Option<u64>) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Whether `delivered` items satisfy the budget
    pub fn is_exhausted(&self, delivered: u64) -> bool {
        self.limit.is_some_and(|limit| delivered >= limit)
    }

    /// Page size to request: the budget if it is below `api_max`, at least 1
    pub fn page_size(&self, api_max: u32) -> u32 {
        match self.limit {
            Some(limit) if limit < api_max as u64 => (limit as u32).max(1),
            _ => api_max,
        }
    }
}

/// What a listing did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListStats {
    /// Pages fetched
    pub pages: u32,
    /// Items handed to the consumer, including the one it stopped on
    pub rows: u64,
    /// True when the consumer or the budget ended the listing
    pub stopped_early: bool,
}

/// Pull-style pagination over a page source
///
/// Each call to [`Paginator::next_page`] fetches exactly one page (with retry)
/// and advances the cursor.
pub struct Paginator<'a, S: PageSource> {
    source: &'a S,
    policy: &'a RetryPolicy,
    page_size: u32,
    cursor: PageCursor,
    pages: u32,
}

impl<'a, S: PageSource> Paginator<'a, S> {
    pub fn new(source: &'a S, policy: &'a RetryPolicy, page_size: u32) -> Self {
        Self {
            source,
            policy,
            page_size: page_size.max(1),
            cursor: PageCursor::Start,
            pages: 0,
        }
    }

    pub fn cursor(&self) -> &PageCursor {
        &self.cursor
    }

    /// Pages fetched so far
    pub fn pages(&self) -> u32 {
        self.pages
    }

    /// Fetch the next page, or None when the listing is finished
    pub async fn next_page(&mut self) -> Result<Option<Vec<S::Item>>, ConnectorError> {
        let Some(request) = self.cursor.request(self.page_size) else {
            return Ok(None);
        };

        let name = self.source.name();
        let source = self.source;
        let page = execute_with_retry(self.policy, name, || source.fetch_page(request.clone()))
            .await
            .map_err(|e| ConnectorError::from_retry(name, e))?;

        self.pages += 1;
        self.cursor = PageCursor::after(page.next_token);

        debug!(
            operation = name,
            page = self.pages,
            items = page.items.len(),
            more = !self.cursor.is_done(),
            "fetched page"
        );

        Ok(Some(page.items))
    }
}

/// Stream every item of a listing to `deliver`.
///
/// Stops when the last page was delivered, when `deliver` returns
/// [`Flow::Stop`], or when `budget` items were delivered. A zero budget
/// returns without fetching.
pub async fn stream_pages<S, D>(
    source: &S,
    policy: &RetryPolicy,
    budget: RowBudget,
    mut deliver: D,
) -> Result<ListStats, ConnectorError>
where
    S: PageSource,
    D: FnMut(S::Item) -> Flow,
{
    let mut stats = ListStats::default();
    if budget.is_exhausted(0) {
        stats.stopped_early = true;
        return Ok(stats);
    }

    let mut paginator = Paginator::new(source, policy, budget.page_size(API_MAX_PAGE_SIZE));

    while let Some(items) = paginator.next_page().await? {
        stats.pages = paginator.pages();
        for item in items {
            stats.rows += 1;
            if deliver(item) == Flow::Stop || budget.is_exhausted(stats.rows) {
                stats.stopped_early = true;
                return Ok(stats);
            }
        }
    }

    Ok(stats)
}
