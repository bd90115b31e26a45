//! Cursor pagination and sequence range arithmetic.
//!
//! [`BatchCursor`] drives the precache sweep over the store; [`SequenceRange`]
//! and [`partition`] carve the seeder's work into contiguous batches.
//!
//! Both rely on the store assigning identifiers that are immutable and
//! strictly increasing. A page that moves the cursor backwards is reported as
//! [`ValidationError::CursorRegression`] instead of being tolerated.

use std::fmt;

use crate::error::ValidationError;
use crate::identity::{IdentityRecord, RecordId};

/// Cursor value before the first page of a sweep.
pub const CURSOR_START: RecordId = 0;

/// Outcome of applying one page to a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStep {
    /// A full page was read, more records may follow.
    Continue,
    /// The end of the table was reached.
    Exhausted,
}

/// `(last_seen_id, page_size)` pair for keyset pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchCursor {
    last_seen: RecordId,
    page_size: usize,
}

impl BatchCursor {
    /// Create a cursor positioned before the first record.
    pub fn new(page_size: usize) -> Result<Self, ValidationError> {
        if page_size == 0 {
            return Err(ValidationError::InvalidValue {
                field: "batch_size".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(Self {
            last_seen: CURSOR_START,
            page_size,
        })
    }

    /// The identifier every record of the next page must exceed.
    pub fn last_seen(&self) -> RecordId {
        self.last_seen
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Advance past `page`.
    ///
    /// The page must contain only identifiers greater than the current
    /// cursor. A short page ends the sweep.
    pub fn advance(&mut self, page: &[IdentityRecord]) -> Result<PageStep, ValidationError> {
        let (Some(min_id), Some(max_id)) = (
            page.iter().map(|r| r.id).min(),
            page.iter().map(|r| r.id).max(),
        ) else {
            return Ok(PageStep::Exhausted);
        };

        if min_id <= self.last_seen {
            return Err(ValidationError::CursorRegression {
                last_seen: self.last_seen,
                observed: min_id,
            });
        }

        self.last_seen = max_id;

        if page.len() < self.page_size {
            Ok(PageStep::Exhausted)
        } else {
            Ok(PageStep::Continue)
        }
    }
}

/// Half-open range `[start, end)` of seeder sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceRange {
    pub start: u64,
    pub end: u64,
}

impl SequenceRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "range start must not exceed end");
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shift the range by `base`, turning a batch offset into sequence numbers.
    ///
    /// Returns `None` when the shifted end does not fit in a `u64`.
    pub fn checked_offset(&self, base: u64) -> Option<Self> {
        Some(Self {
            start: self.start.checked_add(base)?,
            end: self.end.checked_add(base)?,
        })
    }

    pub fn sequences(&self) -> std::ops::Range<u64> {
        self.start..self.end
    }
}

impl fmt::Display for SequenceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Split `[0, total)` into contiguous batches of `batch_size`.
///
/// The last batch is shorter when `total` is not a multiple of `batch_size`.
/// A zero `batch_size` yields no batches.
pub fn partition(total: u64, batch_size: u64) -> Partition {
    Partition {
        next: 0,
        total,
        batch_size,
    }
}

/// Iterator returned by [`partition`].
#[derive(Debug, Clone)]
pub struct Partition {
    next: u64,
    total: u64,
    batch_size: u64,
}

impl Iterator for Partition {
    type Item = SequenceRange;

    fn next(&mut self) -> Option<Self::Item> {
        if self.batch_size == 0 || self.next >= self.total {
            return None;
        }
        let start = self.next;
        let end = start.saturating_add(self.batch_size).min(self.total);
        self.next = end;
        Some(SequenceRange::new(start, end))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.batch_size == 0 {
            0
        } else {
            (self.total.saturating_sub(self.next)).div_ceil(self.batch_size) as usize
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Partition {}
