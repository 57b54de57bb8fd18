//! Pagination engine: drives page-based and offset-based multi-page fetches
//! and decides when a run is done.
//!
//! Each cycle is one full pass through request building, transport,
//! decoding, normalization and child enrichment; the engine only hands out
//! the per-cycle parameter overrides and consumes the cycle's item count and
//! extracted metadata. Caps are honored at cycle boundaries, never mid-parse.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::config::defaults;
use crate::config::PaginationType;

/// Caller-imposed ceilings on one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageCaps {
    pub max_pages: Option<u32>,
    pub max_items: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageState {
    Init,
    More,
    Done,
}

/// Per-run pagination state machine.
#[derive(Debug)]
pub struct Paginator {
    pagination: Option<PaginationType>,
    per_page: u32,
    caps: PageCaps,
    state: PageState,
    page: u32,
    offset: u64,
    pages_fetched: u32,
    items_fetched: usize,
}

impl Paginator {
    pub fn new(pagination: Option<PaginationType>, per_page: u32, caps: PageCaps) -> Self {
        Self {
            pagination,
            per_page: per_page.max(1),
            caps,
            state: PageState::Init,
            page: 1,
            offset: 0,
            pages_fetched: 0,
            items_fetched: 0,
        }
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// Overrides for the next cycle, or `None` once the run is done.
    pub fn next_overrides(
        &self,
        base: &BTreeMap<String, String>,
    ) -> Option<BTreeMap<String, String>> {
        if self.state == PageState::Done {
            return None;
        }
        let mut overrides = base.clone();
        match self.pagination {
            Some(PaginationType::Page) => {
                overrides.insert(defaults::PARAM_PAGE.to_string(), self.page.to_string());
                overrides.insert(
                    defaults::PARAM_PER_PAGE.to_string(),
                    self.per_page.to_string(),
                );
            }
            Some(PaginationType::Offset) => {
                overrides.insert(defaults::PARAM_OFFSET.to_string(), self.offset.to_string());
                overrides.insert(
                    defaults::PARAM_PER_PAGE.to_string(),
                    self.per_page.to_string(),
                );
            }
            None => {}
        }
        Some(overrides)
    }

    /// Record a completed cycle and transition.
    pub fn record_cycle(&mut self, item_count: usize, extra_data: &Map<String, Value>) {
        self.pages_fetched += 1;
        self.items_fetched += item_count;

        if self.pagination.is_none() {
            self.state = PageState::Done;
            return;
        }

        // A short page means the collection is exhausted.
        if item_count < self.per_page as usize {
            self.state = PageState::Done;
            return;
        }
        if let Some(max_pages) = self.caps.max_pages {
            if self.pages_fetched >= max_pages {
                self.state = PageState::Done;
                return;
            }
        }
        if let Some(max_items) = self.caps.max_items {
            if self.items_fetched >= max_items {
                self.state = PageState::Done;
                return;
            }
        }
        if let Some(total_pages) = meta_u64(extra_data, defaults::META_TOTAL_PAGES) {
            if u64::from(self.pages_fetched) >= total_pages {
                self.state = PageState::Done;
                return;
            }
        }
        if let Some(total_items) = meta_u64(extra_data, defaults::META_TOTAL_ITEMS) {
            if self.items_fetched as u64 >= total_items {
                self.state = PageState::Done;
                return;
            }
        }

        match self.pagination {
            Some(PaginationType::Page) => self.page += 1,
            Some(PaginationType::Offset) => self.offset += u64::from(self.per_page),
            None => {}
        }
        self.state = PageState::More;
    }
}

/// Metadata counters arrive as numbers or numeric strings.
fn meta_u64(extra_data: &Map<String, Value>, key: &str) -> Option<u64> {
    match extra_data.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(total_pages: u64) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert(defaults::META_TOTAL_PAGES.to_string(), json!(total_pages));
        m
    }

    #[test]
    fn page_counts_10_10_4_stop_after_three_pages() {
        let mut p = Paginator::new(Some(PaginationType::Page), 10, PageCaps::default());
        let base = BTreeMap::new();

        let o1 = p.next_overrides(&base).unwrap();
        assert_eq!(o1.get("page").map(String::as_str), Some("1"));
        p.record_cycle(10, &Map::new());

        let o2 = p.next_overrides(&base).unwrap();
        assert_eq!(o2.get("page").map(String::as_str), Some("2"));
        p.record_cycle(10, &Map::new());

        let o3 = p.next_overrides(&base).unwrap();
        assert_eq!(o3.get("page").map(String::as_str), Some("3"));
        p.record_cycle(4, &Map::new());

        assert!(p.next_overrides(&base).is_none());
        assert_eq!(p.pages_fetched(), 3);
    }

    #[test]
    fn offset_advances_by_page_size() {
        let mut p = Paginator::new(Some(PaginationType::Offset), 25, PageCaps::default());
        let base = BTreeMap::new();

        let o1 = p.next_overrides(&base).unwrap();
        assert_eq!(o1.get("offset").map(String::as_str), Some("0"));
        p.record_cycle(25, &Map::new());

        let o2 = p.next_overrides(&base).unwrap();
        assert_eq!(o2.get("offset").map(String::as_str), Some("25"));
    }

    #[test]
    fn metadata_total_pages_stops_full_pages() {
        let mut p = Paginator::new(Some(PaginationType::Page), 10, PageCaps::default());
        let base = BTreeMap::new();
        p.next_overrides(&base).unwrap();
        p.record_cycle(10, &meta(1));
        assert!(p.next_overrides(&base).is_none());
    }

    #[test]
    fn caps_stop_at_cycle_boundary() {
        let caps = PageCaps {
            max_pages: Some(2),
            max_items: None,
        };
        let mut p = Paginator::new(Some(PaginationType::Page), 10, caps);
        let base = BTreeMap::new();
        p.next_overrides(&base).unwrap();
        p.record_cycle(10, &Map::new());
        p.next_overrides(&base).unwrap();
        p.record_cycle(10, &Map::new());
        assert!(p.next_overrides(&base).is_none());
    }

    #[test]
    fn no_pagination_means_one_cycle() {
        let mut p = Paginator::new(None, 10, PageCaps::default());
        let base = BTreeMap::from([("search".to_string(), "q".to_string())]);
        let o = p.next_overrides(&base).unwrap();
        assert_eq!(o.get("search").map(String::as_str), Some("q"));
        assert!(!o.contains_key("page"));
        p.record_cycle(50, &Map::new());
        assert!(p.next_overrides(&base).is_none());
    }
}
