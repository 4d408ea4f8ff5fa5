//! Pagination records.

use std::collections::BTreeMap;

use crate::{item::Item, value::Value};

/// One page of a paginated query.
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<Item>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub prev_page: Option<usize>,
    pub next_page: Option<usize>,
    pub is_first_page: bool,
    pub is_last_page: bool,
}

impl Page {
    pub fn new(items: Vec<Item>, current_page: usize, total_pages: usize, total_items: usize) -> Self {
        Self {
            items,
            current_page,
            total_pages,
            total_items,
            prev_page: (current_page > 1).then(|| current_page - 1),
            next_page: (current_page < total_pages).then(|| current_page + 1),
            is_first_page: current_page == 1,
            is_last_page: current_page == total_pages,
        }
    }

    /// Scalar page fields as a map (items excluded).
    pub fn info(&self) -> BTreeMap<String, Value> {
        BTreeMap::from([
            ("current_page".to_string(), self.current_page.into()),
            ("total_pages".to_string(), self.total_pages.into()),
            ("total_items".to_string(), self.total_items.into()),
            ("prev_page".to_string(), self.prev_page.into()),
            ("next_page".to_string(), self.next_page.into()),
            ("is_first_page".to_string(), self.is_first_page.into()),
            ("is_last_page".to_string(), self.is_last_page.into()),
        ])
    }
}
