//! Query shaping: filters, projection, sort and pagination from request parameters.

mod filter;
mod pagination;
mod shaper;

pub use filter::{Comparison, Condition, Filter, GeoWithin};
pub use pagination::{PageRef, Pagination};
pub use shaper::{
    shape, QueryShaper, QuerySpec, ShapedQuery, SortDirection, SortKey, DEFAULT_LIMIT, DEFAULT_PAGE,
    MAX_LIMIT, RESERVED_KEYS,
};
