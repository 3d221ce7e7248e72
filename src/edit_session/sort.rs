//! Click-to-sort state for the record table.
//!
//! Clicking a column header cycles it ascending, descending, then back
//! to unsorted. Clicking a different column replaces the primary sort.
//! Secondary keys break ties in a stable chain.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::RecordRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortColumn {
    Date,
    ProductName,
    Color,
    Amount,
    Unit,
    Total,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    fn apply(self, ord: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: SortColumn,
    pub direction: SortDirection,
}

/// Ordered list of sort keys; the first is the primary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl SortSpec {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    /// Direction shown in the header indicator for a column, if any.
    pub fn direction_of(&self, column: SortColumn) -> Option<SortDirection> {
        self.keys
            .iter()
            .find(|key| key.column == column)
            .map(|key| key.direction)
    }

    /// Header-click behavior. Same column: ascending, then descending,
    /// then the sort is removed entirely. New column: replaces the whole
    /// spec with ascending on that column.
    pub fn toggle(&mut self, column: SortColumn) {
        match self.keys.first() {
            Some(primary) if primary.column == column => match primary.direction {
                SortDirection::Ascending => {
                    self.keys[0].direction = SortDirection::Descending;
                }
                SortDirection::Descending => {
                    self.keys.clear();
                }
            },
            _ => {
                self.keys = vec![SortKey {
                    column,
                    direction: SortDirection::Ascending,
                }];
            }
        }
    }

    /// Appends a tie-breaker; an existing key for the column is replaced
    /// in place, keeping its position in the chain.
    pub fn add_secondary(&mut self, column: SortColumn, direction: SortDirection) {
        if let Some(existing) = self.keys.iter_mut().find(|key| key.column == column) {
            existing.direction = direction;
        } else {
            self.keys.push(SortKey { column, direction });
        }
    }

    /// Stable in-place sort over the visible rows. With no keys the rows
    /// keep their incoming order.
    pub fn apply(&self, rows: &mut [RecordRow]) {
        if self.keys.is_empty() {
            return;
        }
        rows.sort_by(|a, b| {
            for key in &self.keys {
                let ord = key.direction.apply(compare_by(key.column, a, b));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }
}

fn compare_by(column: SortColumn, a: &RecordRow, b: &RecordRow) -> Ordering {
    match column {
        SortColumn::Date => a.date.cmp(&b.date),
        SortColumn::ProductName => a.product_name.cmp(&b.product_name),
        SortColumn::Color => a.color.cmp(&b.color),
        SortColumn::Amount => a.amount.cmp(&b.amount),
        SortColumn::Unit => a.unit.cmp(&b.unit),
        SortColumn::Total => a.total().cmp(&b.total()),
    }
}
