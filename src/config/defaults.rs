//! Immutable default-data tables, injected at startup and never mutated.

/// Reserved runtime parameter names. Values for these come from the caller's
/// override map first, then from Service Request defaults.
pub const PARAM_PAGE: &str = "page";
pub const PARAM_PER_PAGE: &str = "per_page";
pub const PARAM_OFFSET: &str = "offset";
pub const PARAM_SEARCH: &str = "search";

pub const RESERVED_PARAMS: &[&str] = &[PARAM_PAGE, PARAM_PER_PAGE, PARAM_OFFSET, PARAM_SEARCH];

/// Template placeholder form of a reserved parameter (e.g. `{page}`).
pub fn placeholder(param: &str) -> String {
    format!("{{{}}}", param)
}

/// Page size used when neither the caller nor the Service Request sets one.
pub const DEFAULT_PER_PAGE: u32 = 10;

/// Well-known extraData metadata keys the pagination engine reads. Service
/// Request response keys (with `list_item = false`) map provider fields onto
/// these names.
pub const META_TOTAL_ITEMS: &str = "total_items";
pub const META_TOTAL_PAGES: &str = "total_pages";
pub const META_PER_PAGE: &str = "per_page";
pub const META_CURRENT_PAGE: &str = "current_page";
pub const META_OFFSET: &str = "offset";

/// Hard ceiling on recursive child-request depth unless a tighter limit is
/// configured on the pipeline.
pub const DEFAULT_MAX_CHILD_DEPTH: usize = 4;

/// Default bound on concurrently running per-item child requests.
pub const DEFAULT_CHILD_CONCURRENCY: usize = 5;
