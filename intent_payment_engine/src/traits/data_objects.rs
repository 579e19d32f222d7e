use serde::{Deserialize, Serialize};

/// Outcome of an idempotent insert. Replayed events hit `AlreadyExists` and are not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    Inserted,
    AlreadyExists,
}

impl InsertResult {
    pub fn was_inserted(&self) -> bool {
        matches!(self, InsertResult::Inserted)
    }
}

//--------------------------------------     Pagination      ---------------------------------------------------------
pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: i64,
    pub limit: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { offset: 0, limit: DEFAULT_PAGE_SIZE }
    }
}

impl Pagination {
    pub fn new(offset: i64, limit: i64) -> Self {
        Self { offset: offset.max(0), limit: limit.clamp(1, MAX_PAGE_SIZE) }
    }

    pub fn next_page(&self) -> Self {
        Self { offset: self.offset + self.limit, limit: self.limit }
    }
}

/// A page of results along with the total row count for the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
}

impl<T> Paged<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: Pagination) -> Self {
        Self { items, total, offset: pagination.offset, limit: pagination.limit }
    }

    pub fn is_last_page(&self) -> bool {
        self.offset + (self.items.len() as i64) >= self.total
    }
}
