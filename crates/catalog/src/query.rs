//! Read-side query shapes: item filters, paging and aggregates.

use serde::{Deserialize, Serialize};

use fleamarket_core::{CategoryId, DomainError, DomainResult, UserId};

use crate::item::Item;

/// Page size used when a request does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Upper bound on a single page.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Filter criteria for item listings. Every `None` field is "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFilter {
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub owner_id: Option<UserId>,
    pub category_id: Option<CategoryId>,
    pub sold_out: Option<bool>,
    /// Case-insensitive substring matched against name and description.
    pub keyword: Option<String>,
}

impl ItemFilter {
    pub fn price_range(min: u64, max: u64) -> Self {
        Self {
            min_price: Some(min),
            max_price: Some(max),
            ..Default::default()
        }
    }

    /// In-process evaluation, used by stores that cannot push filters down.
    ///
    /// Deleted items never match.
    pub fn matches(&self, item: &Item) -> bool {
        if item.is_deleted() {
            return false;
        }
        if self.min_price.is_some_and(|min| item.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| item.price > max) {
            return false;
        }
        if self.owner_id.is_some_and(|owner| item.owner_id != owner) {
            return false;
        }
        if self.category_id.is_some_and(|c| item.category_id != c) {
            return false;
        }
        if self.sold_out.is_some_and(|s| item.sold_out != s) {
            return false;
        }
        if let Some(keyword) = self.keyword.as_deref() {
            let needle = keyword.to_lowercase();
            if !item.name.to_lowercase().contains(&needle)
                && !item.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }

    /// Keyword as a SQL `ILIKE` pattern with wildcards escaped.
    pub fn keyword_pattern(&self) -> Option<String> {
        self.keyword.as_deref().map(|k| {
            let escaped = k
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            format!("%{escaped}%")
        })
    }
}

/// A validated, 1-indexed page request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> DomainResult<Self> {
        if page == 0 {
            return Err(DomainError::invalid_input("page is 1-indexed"));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(DomainError::invalid_input(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(Self { page, page_size })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    /// Slice `rows` to this page. A page past the end yields an empty vec.
    pub fn slice<T>(&self, rows: Vec<T>) -> Vec<T> {
        let offset = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        rows.into_iter()
            .skip(offset)
            .take(self.page_size as usize)
            .collect()
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of results plus the total count across all pages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page(),
            page_size: request.page_size(),
        }
    }

    pub fn has_more(&self) -> bool {
        u64::from(self.page) * u64::from(self.page_size) < self.total
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
        }
    }
}

/// Aggregate over the live listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStatistics {
    pub total_items: u64,
    pub sold_items: u64,
    /// Mean price in minor units; `0.0` when there are no items.
    pub average_price: f64,
}

impl ItemStatistics {
    pub fn from_items(items: &[Item]) -> Self {
        let live: Vec<&Item> = items.iter().filter(|i| !i.is_deleted()).collect();
        let total_items = live.len() as u64;
        let sold_items = live.iter().filter(|i| i.sold_out).count() as u64;
        let average_price = if total_items == 0 {
            0.0
        } else {
            let sum: u128 = live.iter().map(|i| u128::from(i.price)).sum();
            sum as f64 / total_items as f64
        };
        Self {
            total_items,
            sold_items,
            average_price,
        }
    }
}
