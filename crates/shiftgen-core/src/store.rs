use crate::error::ShiftError;
use crate::identifiers::{ItemId, ListId};
use crate::record::{Fields, ListRecord};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Half-open date window on a date column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRangeFilter {
    pub field: String,
    pub start: NaiveDate,
    pub end_exclusive: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// `(field, value)` equality clauses, combined with `and`.
    pub equals: Vec<(String, String)>,
    pub date_range: Option<DateRangeFilter>,
    /// Columns to return; empty means all columns.
    pub select: Vec<String>,
}

impl ListQuery {
    pub fn has_filter(&self) -> bool {
        !self.equals.is_empty() || self.date_range.is_some()
    }

    /// Same projection without any server-side filtering.
    pub fn without_filter(&self) -> Self {
        Self {
            equals: Vec::new(),
            date_range: None,
            select: self.select.clone(),
        }
    }
}

/// Generic access to a list-based record store. Implementations page through
/// results transparently and report rejected filters as
/// [`ShiftError::Remote`] so callers can detect non-indexed columns.
#[async_trait]
pub trait ListStore: Send + Sync {
    async fn list_items(&self, list: &ListId, query: &ListQuery)
        -> Result<Vec<ListRecord>, ShiftError>;

    async fn get_item(&self, list: &ListId, id: &ItemId) -> Result<Option<ListRecord>, ShiftError>;

    async fn create_item(&self, list: &ListId, fields: Fields) -> Result<ItemId, ShiftError>;

    async fn patch_fields(&self, list: &ListId, id: &ItemId, fields: Fields)
        -> Result<(), ShiftError>;
}
