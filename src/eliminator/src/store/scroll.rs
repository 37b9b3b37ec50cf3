use std::sync::Arc;
use std::time::Duration;

use super::{StoreResult, UnitSelector};
use crate::model::Unit;
use crate::query::SelectQuery;

/// Pull iterator over a unit selection.
///
/// The cursor is opaque and not resumable across runs.
pub struct UnitScroll {
    selector: Arc<dyn UnitSelector>,
    query: SelectQuery,
    page_size: usize,
    keep_alive: Duration,
    cursor: Option<String>,
    done: bool,
}

impl UnitScroll {
    pub fn new(
        selector: Arc<dyn UnitSelector>,
        query: SelectQuery,
        page_size: usize,
        keep_alive: Duration,
    ) -> Self {
        Self {
            selector,
            query,
            page_size: page_size.max(1),
            keep_alive,
            cursor: None,
            done: false,
        }
    }

    /// Next non-empty page, or `None` once the selection is exhausted.
    pub async fn next_batch(&mut self) -> StoreResult<Option<Vec<Unit>>> {
        while !self.done {
            let page = self
                .selector
                .scroll(&self.query, self.cursor.take(), self.page_size, self.keep_alive)
                .await?;
            self.done = page.cursor.is_none();
            self.cursor = page.cursor;
            if !page.units.is_empty() {
                return Ok(Some(page.units));
            }
        }
        Ok(None)
    }
}
