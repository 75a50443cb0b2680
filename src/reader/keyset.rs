//! # Keyset Paging Reader
//!
//! Generic cursor reader driven by three collaborators: a query builder that
//! restricts rows to those after the last cursor, an executor that runs the
//! query capped at the page size, and an extractor that projects a row onto
//! its cursor. The first page carries no lower bound at all.

use super::checkpoint::{cursor_key, ExecutionContext};
use super::state::{CursorState, ReaderLifecycle};
use super::traits::{CursorExtractor, PageQueryBuilder, PageReader, QueryExecutor};
use crate::error::{ReaderError, ReaderResult};
use crate::logging;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::marker::PhantomData;
use tracing::{debug, info, warn};

/// Cursor types usable by [`KeysetPagingReader`]
pub trait CursorKey: Ord + Clone + Debug + Serialize + DeserializeOwned + Send + Sync {}

impl<K> CursorKey for K where K: Ord + Clone + Debug + Serialize + DeserializeOwned + Send + Sync {}

pub struct KeysetPagingReader<T, K, E, Q, X> {
    name: String,
    executor: E,
    query_builder: Q,
    cursor_extractor: X,
    page_size: u32,
    save_state: bool,
    state: CursorState<K>,
    lifecycle: ReaderLifecycle,
    page: u32,
    _row: PhantomData<fn() -> T>,
}

impl<T, K, E, Q, X> KeysetPagingReader<T, K, E, Q, X>
where
    T: Send + 'static,
    K: CursorKey + 'static,
    E: QueryExecutor<T>,
    Q: PageQueryBuilder<E, K>,
    X: CursorExtractor<T, K>,
{
    /// Create a reader; `page_size` must be positive
    pub fn new(executor: E, query_builder: Q, cursor_extractor: X, page_size: u32) -> ReaderResult<Self> {
        if page_size == 0 {
            return Err(ReaderError::configuration(
                "keyset_paging_reader",
                "page size must be greater than 0",
            ));
        }

        Ok(Self {
            name: "keyset-paging-reader".to_string(),
            executor,
            query_builder,
            cursor_extractor,
            page_size,
            save_state: false,
            state: CursorState::AwaitingFirstPage,
            lifecycle: ReaderLifecycle::Unopened,
            page: 0,
            _row: PhantomData,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_save_state(mut self, save_state: bool) -> Self {
        self.save_state = save_state;
        self
    }

    pub fn cursor_state(&self) -> &CursorState<K> {
        &self.state
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Number of pages fetched since open
    pub fn pages_read(&self) -> u32 {
        self.page
    }
}

#[async_trait]
impl<T, K, E, Q, X> PageReader<T> for KeysetPagingReader<T, K, E, Q, X>
where
    T: Send + 'static,
    K: CursorKey + 'static,
    E: QueryExecutor<T>,
    Q: PageQueryBuilder<E, K>,
    X: CursorExtractor<T, K>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }

    fn lifecycle(&self) -> ReaderLifecycle {
        self.lifecycle
    }

    fn save_state(&self) -> bool {
        self.save_state
    }

    async fn open(&mut self, context: &ExecutionContext) -> ReaderResult<()> {
        if self.lifecycle.is_readable() {
            return Err(ReaderError::state("open", self.lifecycle));
        }

        self.state.reset();
        self.page = 0;
        if self.save_state {
            if let Some(cursor) = context.get::<K>(&cursor_key(&self.name))? {
                debug!(reader = %self.name, cursor = ?cursor, "Restoring saved cursor");
                self.state = CursorState::Streaming { last: cursor };
            }
        }
        self.lifecycle = ReaderLifecycle::Open;

        info!(
            reader = %self.name,
            page_size = self.page_size,
            resumed = !self.state.is_first_page(),
            "Reader opened"
        );
        Ok(())
    }

    async fn read_page(&mut self) -> ReaderResult<Vec<T>> {
        self.lifecycle.ensure_readable("read_page")?;

        let query = self
            .query_builder
            .build_page_query(&self.executor, self.state.last_cursor());

        let mut rows = match self.executor.fetch_page(query, self.page_size).await {
            Ok(rows) => rows,
            Err(error) => {
                logging::log_error("keyset_paging_reader", "read_page", &error.to_string(), Some(&self.name));
                return Err(error);
            }
        };

        let limit = self.page_size as usize;
        if rows.len() > limit {
            warn!(
                reader = %self.name,
                returned = rows.len(),
                page_size = self.page_size,
                "Executor returned more rows than the page size; truncating"
            );
            rows.truncate(limit);
        }

        if let Some(last) = rows.last() {
            let next = self.cursor_extractor.extract_cursor(last);
            if let Err(error) = self.state.advance(next) {
                warn!(reader = %self.name, error = %error, "Rejecting page");
                return Err(error);
            }
        }
        self.lifecycle = ReaderLifecycle::after_page(rows.len());

        let cursor = self.state.last_cursor().map(|c| format!("{c:?}"));
        logging::log_page_operation(
            &self.name,
            self.page,
            rows.len(),
            cursor.as_deref(),
            if rows.is_empty() { "exhausted" } else { "read" },
        );
        self.page += 1;

        Ok(rows)
    }

    fn jump_to_page(&mut self, page_index: u32) {
        warn!(
            reader = %self.name,
            page_index = page_index,
            "Ignoring jump_to_page: keyset readers only move forward from the cursor"
        );
    }

    fn update(&self, context: &mut ExecutionContext) -> ReaderResult<()> {
        if self.save_state {
            if let Some(cursor) = self.state.last_cursor() {
                context.put(cursor_key(&self.name), cursor)?;
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> ReaderResult<()> {
        if !self.lifecycle.is_readable() {
            return Err(ReaderError::state("close", self.lifecycle));
        }
        self.lifecycle = ReaderLifecycle::Closed;
        info!(reader = %self.name, pages = self.page, "Reader closed");
        Ok(())
    }
}
