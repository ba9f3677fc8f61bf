use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u64 = 20;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub page_size: u64,
    /// Zero-based offset of the first row of this page.
    pub start: u64,
    pub rows: Vec<T>,
    pub total: u64,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self::empty(DEFAULT_PAGE_SIZE)
    }
}

impl<T> Page<T> {
    pub fn new(page_size: u64, start: u64, rows: Vec<T>, total: u64) -> Self {
        Self {
            page_size: page_size.max(1),
            start,
            rows,
            total,
        }
    }

    pub fn empty(page_size: u64) -> Self {
        Self::new(page_size, 0, Vec::new(), 0)
    }

    /// Row offset of the first row of `page_no` (1-based).
    pub fn start_of(page_no: u64, page_size: u64) -> u64 {
        page_no.saturating_sub(1).saturating_mul(page_size)
    }

    /// Slices an in-memory list the same way a paginated query would.
    pub fn from_vec(items: Vec<T>, page_no: u64, page_size: u64) -> Self {
        let page_size = page_size.max(1);
        let total = items.len() as u64;
        let start = Self::start_of(page_no, page_size);
        let rows = items
            .into_iter()
            .skip(start as usize)
            .take(page_size as usize)
            .collect();
        Self::new(page_size, start, rows, total)
    }

    pub fn page_no(&self) -> u64 {
        self.start / self.page_size + 1
    }

    pub fn total_page_count(&self) -> u64 {
        self.total.div_ceil(self.page_size)
    }

    pub fn has_next_page(&self) -> bool {
        self.page_no() < self.total_page_count()
    }

    pub fn has_previous_page(&self) -> bool {
        self.page_no() > 1
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            page_size: self.page_size,
            start: self.start,
            rows: self.rows.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}
