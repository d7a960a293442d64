//! Page-based pagination descriptor for list responses.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PageRef {
    pub page: u64,
    pub limit: u64,
}

/// `next` is present iff `page * limit < total`; `prev` iff `page > 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<PageRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<PageRef>,
}

impl Pagination {
    /// `page` and `limit` must already be at least 1.
    pub fn compute(page: u64, limit: u64, total: u64) -> Self {
        let start = (page - 1).saturating_mul(limit);
        let end = page.saturating_mul(limit);
        Pagination {
            page,
            limit,
            next: (end < total).then_some(PageRef { page: page + 1, limit }),
            prev: (start > 0).then_some(PageRef { page: page - 1, limit }),
        }
    }
}
