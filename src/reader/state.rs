//! Reader state definitions.
//!
//! The cursor moves through a one-way transition: the first page is read with an
//! inclusive (or absent) lower bound, every later page with a strict `>` bound
//! against the last cursor seen.

use crate::error::{ReaderError, ReaderResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison used against the lower bound of a page query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    /// First page: `>=` against the sentinel
    GreaterOrEqual,
    /// Every page after a cursor has been seen
    Greater,
}

impl ComparisonOperator {
    /// SQL spelling of the operator
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::GreaterOrEqual => ">=",
            Self::Greater => ">",
        }
    }

    /// Whether `candidate` passes this comparison against `bound`
    pub fn admits<K: Ord + ?Sized>(&self, candidate: &K, bound: &K) -> bool {
        match self {
            Self::GreaterOrEqual => candidate >= bound,
            Self::Greater => candidate > bound,
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Position of a reader within its keyset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorState<K> {
    /// No row has been returned yet
    AwaitingFirstPage,
    /// At least one page has been returned; `last` is the cursor of its final row
    Streaming { last: K },
}

impl<K> Default for CursorState<K> {
    fn default() -> Self {
        Self::AwaitingFirstPage
    }
}

impl<K> CursorState<K> {
    /// Cursor of the last row returned, if any
    pub fn last_cursor(&self) -> Option<&K> {
        match self {
            Self::AwaitingFirstPage => None,
            Self::Streaming { last } => Some(last),
        }
    }

    pub fn is_first_page(&self) -> bool {
        matches!(self, Self::AwaitingFirstPage)
    }

    /// Operator for the next page query
    pub fn operator(&self) -> ComparisonOperator {
        match self {
            Self::AwaitingFirstPage => ComparisonOperator::GreaterOrEqual,
            Self::Streaming { .. } => ComparisonOperator::Greater,
        }
    }

    /// Operator and bound for the next page, falling back to `sentinel` on the first page
    pub fn lower_bound<'a>(&'a self, sentinel: &'a K) -> (ComparisonOperator, &'a K) {
        (self.operator(), self.last_cursor().unwrap_or(sentinel))
    }

    pub fn reset(&mut self) {
        *self = Self::AwaitingFirstPage;
    }
}

impl<K: Ord + fmt::Debug> CursorState<K> {
    /// Move to `next`; the cursor never moves backwards
    pub fn advance(&mut self, next: K) -> ReaderResult<()> {
        if let Self::Streaming { last } = self {
            if next < *last {
                return Err(ReaderError::cursor_regression(
                    format!("{last:?}"),
                    format!("{next:?}"),
                ));
            }
        }
        *self = Self::Streaming { last: next };
        Ok(())
    }
}

/// Lifecycle of a reader instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderLifecycle {
    Unopened,
    Open,
    /// Last fetch returned no rows; further fetches are still allowed
    Exhausted,
    Closed,
}

impl ReaderLifecycle {
    /// Whether pages may be fetched in this state
    pub fn is_readable(&self) -> bool {
        matches!(self, Self::Open | Self::Exhausted)
    }

    /// Ensure `operation` is allowed in this state
    pub fn ensure_readable(&self, operation: &str) -> ReaderResult<()> {
        if self.is_readable() {
            Ok(())
        } else {
            Err(ReaderError::state(operation, self))
        }
    }

    /// State after a page of `rows` rows has been returned
    pub fn after_page(rows: usize) -> Self {
        if rows == 0 {
            Self::Exhausted
        } else {
            Self::Open
        }
    }
}

impl fmt::Display for ReaderLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unopened => write!(f, "unopened"),
            Self::Open => write!(f, "open"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Closed => write!(f, "closed"),
        }
    }
}
