/// Page bound for keyset queries: a row cap with no offset.
///
/// Rows already consumed are excluded by the cursor predicate, so query cost
/// stays flat regardless of how many pages have been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: u32,
}

impl Pagination {
    /// Create pagination capped at `page_size` rows
    pub fn new(page_size: u32) -> Self {
        Self { limit: page_size }
    }

    /// Convert to SQL string
    pub fn to_sql(&self) -> String {
        format!(" LIMIT {}", self.limit)
    }

    /// Whether a fetched page was full, i.e. more rows may follow
    pub fn is_full(&self, rows: usize) -> bool {
        rows as u64 >= u64::from(self.limit)
    }
}
