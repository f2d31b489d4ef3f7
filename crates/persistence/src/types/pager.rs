//! Pagination state for page reads.
//!
//! A [`Pager`] is an in/out parameter: the caller sets the page shape, and the
//! callee writes the continuation cursor and the running result count back
//! into the same instance so pagination state threads through nested calls.

use serde::{Deserialize, Serialize};

/// Default number of objects per page.
pub const DEFAULT_LIMIT: u32 = 30;

/// Default upper bound for the page limit.
pub const MAX_LIMIT: u32 = 10_000;

/// Default sort attribute.
pub const DEFAULT_SORT_BY: &str = "timestamp";

/// Pagination and cursor state for a page read.
///
/// The continuation cursor (`last_key`) returned by request N is only valid
/// as the input cursor of request N+1 for the same query shape.
///
/// # Examples
///
/// ```
/// use stratus_persistence::types::Pager;
///
/// let mut pager = Pager::new(-2, -50);
/// assert_eq!(pager.page(), 2);
/// assert_eq!(pager.limit(), 50);
/// assert_eq!(pager.sort_by(), "timestamp");
/// assert!(pager.is_desc());
///
/// pager.clamp_limit(20);
/// assert_eq!(pager.limit(), 20);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PagerRepr")]
pub struct Pager {
    page: u64,
    limit: u32,
    sort_by: String,
    desc: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_key: Option<String>,
    count: u64,
}

impl Default for Pager {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
            sort_by: DEFAULT_SORT_BY.to_string(),
            desc: true,
            last_key: None,
            count: 0,
        }
    }
}

/// Wire form of [`Pager`]. Deserialized values go through the same
/// coercion as the setters.
#[derive(Deserialize)]
#[serde(default)]
struct PagerRepr {
    page: i64,
    limit: i64,
    sort_by: String,
    desc: bool,
    last_key: Option<String>,
    count: u64,
}

impl Default for PagerRepr {
    fn default() -> Self {
        Self {
            page: 1,
            limit: i64::from(DEFAULT_LIMIT),
            sort_by: DEFAULT_SORT_BY.to_string(),
            desc: true,
            last_key: None,
            count: 0,
        }
    }
}

impl From<PagerRepr> for Pager {
    fn from(repr: PagerRepr) -> Self {
        let mut pager = Pager::new(repr.page, repr.limit)
            .with_sort_by(repr.sort_by)
            .with_desc(repr.desc);
        pager.set_last_key(repr.last_key);
        pager.set_count(repr.count);
        pager
    }
}

impl Pager {
    /// Creates a pager for the given page and limit.
    ///
    /// Negative values are coerced to their absolute value, page 0 becomes 1
    /// and a zero limit falls back to [`DEFAULT_LIMIT`].
    pub fn new(page: i64, limit: i64) -> Self {
        let mut pager = Self::default();
        pager.set_page(page);
        pager.set_limit(limit);
        pager
    }

    /// Creates a pager with the given limit on the first page.
    pub fn with_limit(limit: i64) -> Self {
        Self::new(1, limit)
    }

    /// Sets the sort attribute. A blank name restores the default.
    pub fn with_sort_by(mut self, sort_by: impl Into<String>) -> Self {
        self.set_sort_by(sort_by);
        self
    }

    /// Sets the sort order.
    pub fn with_desc(mut self, desc: bool) -> Self {
        self.desc = desc;
        self
    }

    /// Resumes from a continuation cursor.
    pub fn with_last_key(mut self, last_key: impl Into<String>) -> Self {
        self.set_last_key(Some(last_key.into()));
        self
    }

    /// The 1-based page number.
    pub fn page(&self) -> u64 {
        self.page
    }

    /// The maximum number of objects per page.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// The sort attribute.
    pub fn sort_by(&self) -> &str {
        &self.sort_by
    }

    /// Returns `true` for descending order.
    pub fn is_desc(&self) -> bool {
        self.desc
    }

    /// The continuation cursor, if any.
    pub fn last_key(&self) -> Option<&str> {
        self.last_key.as_deref()
    }

    /// The running number of results.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Sets the page number.
    pub fn set_page(&mut self, page: i64) {
        self.page = page.unsigned_abs().max(1);
    }

    /// Sets the limit.
    pub fn set_limit(&mut self, limit: i64) {
        let limit = u32::try_from(limit.unsigned_abs()).unwrap_or(u32::MAX);
        self.limit = if limit == 0 { DEFAULT_LIMIT } else { limit };
    }

    /// Sets the sort attribute.
    pub fn set_sort_by(&mut self, sort_by: impl Into<String>) {
        let sort_by = sort_by.into();
        self.sort_by = if sort_by.trim().is_empty() {
            DEFAULT_SORT_BY.to_string()
        } else {
            sort_by
        };
    }

    /// Sets the continuation cursor. Blank cursors are cleared.
    pub fn set_last_key(&mut self, last_key: Option<String>) {
        self.last_key = last_key.filter(|k| !k.is_empty());
    }

    /// Adds the number of rows returned by one page read.
    pub fn add_count(&mut self, n: usize) {
        self.count = self.count.saturating_add(n as u64);
    }

    /// Overwrites the result count.
    pub fn set_count(&mut self, count: u64) {
        self.count = count;
    }

    /// Bounds the limit by `max`.
    pub fn clamp_limit(&mut self, max: u32) {
        if max > 0 && self.limit > max {
            self.limit = max;
        }
    }

    /// Returns `true` if the cursor moved past `previous`.
    ///
    /// An unchanged cursor across two page calls means there is no more data.
    pub fn has_advanced(&self, previous: Option<&str>) -> bool {
        self.last_key.is_some() && self.last_key.as_deref() != previous
    }
}
