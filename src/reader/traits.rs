//! Reader and collaborator contracts.
//!
//! The readers own only cursor bookkeeping. Building and running the bounded
//! query belongs to the data-source collaborators defined here, so alternate
//! backends plug in by implementing these traits.

use super::checkpoint::ExecutionContext;
use super::state::{ComparisonOperator, ReaderLifecycle};
use super::transactional::CompositeKeyEntity;
use crate::error::ReaderResult;
use crate::query_builder::{NamedQuery, QueryParameters};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// A reader that yields rows one bounded page at a time
#[async_trait]
pub trait PageReader<T: Send>: Send {
    fn name(&self) -> &str;

    fn page_size(&self) -> u32;

    fn lifecycle(&self) -> ReaderLifecycle;

    /// Whether `update` writes the cursor and `open` restores it
    fn save_state(&self) -> bool;

    /// Acquire resources and position before the first row (or at the saved cursor)
    async fn open(&mut self, context: &ExecutionContext) -> ReaderResult<()>;

    /// Fetch the next page. An empty page means no rows past the cursor.
    /// On error the cursor is left where it was.
    async fn read_page(&mut self) -> ReaderResult<Vec<T>>;

    /// Keyset readers have no random access; this never moves the cursor.
    fn jump_to_page(&mut self, page_index: u32);

    /// Write restart state into `context`
    fn update(&self, context: &mut ExecutionContext) -> ReaderResult<()>;

    /// Release the session/connection acquired by `open`
    async fn close(&mut self) -> ReaderResult<()>;
}

/// Backend-specific query type produced by a [`PageQueryBuilder`]
pub trait QueryContext: Send + Sync {
    type Query: Send;
}

/// Executes a page query capped at `page_size` rows, with no offset
#[async_trait]
pub trait QueryExecutor<T>: QueryContext {
    async fn fetch_page(&self, query: Self::Query, page_size: u32) -> ReaderResult<Vec<T>>;
}

/// Builds a query ordered ascending by the cursor field, restricted to rows
/// after `last_cursor` (or unrestricted when it is `None`)
pub trait PageQueryBuilder<C: QueryContext, K>: Send + Sync {
    fn build_page_query(&self, context: &C, last_cursor: Option<&K>) -> C::Query;
}

impl<C, K, F> PageQueryBuilder<C, K> for F
where
    C: QueryContext,
    F: Fn(&C, Option<&K>) -> C::Query + Send + Sync,
{
    fn build_page_query(&self, context: &C, last_cursor: Option<&K>) -> C::Query {
        self(context, last_cursor)
    }
}

/// Pure projection of a row onto its cursor value
pub trait CursorExtractor<T, K>: Send + Sync {
    fn extract_cursor(&self, row: &T) -> K;
}

impl<T, K, F> CursorExtractor<T, K> for F
where
    F: Fn(&T) -> K + Send + Sync,
{
    fn extract_cursor(&self, row: &T) -> K {
        self(row)
    }
}

/// Everything a session needs to run one page of the transactional reader
#[derive(Debug)]
pub struct PageRequest<'a, K> {
    pub query: &'a NamedQuery,
    pub operator: ComparisonOperator,
    /// Sentinel key on the first page, the last key returned afterwards
    pub lower_bound: &'a K,
    pub page_size: u32,
}

/// A persistence session with explicit transaction demarcation
#[async_trait]
pub trait ReaderSession<T: CompositeKeyEntity>: Send {
    async fn begin(&mut self) -> ReaderResult<()>;

    /// Push pending changes so the next query sees a consistent view
    async fn flush(&mut self) -> ReaderResult<()>;

    /// Drop everything the session tracks
    fn clear(&mut self);

    async fn fetch(&mut self, request: &PageRequest<'_, T::Key>) -> ReaderResult<Vec<T>>;

    /// Stop tracking a single row
    fn detach(&mut self, row: &T);

    async fn commit(&mut self) -> ReaderResult<()>;

    async fn rollback(&mut self) -> ReaderResult<()>;

    async fn close(&mut self) -> ReaderResult<()>;
}

/// Opens sessions for the transactional reader
#[async_trait]
pub trait SessionFactory<T: CompositeKeyEntity>: Send + Sync {
    type Session: ReaderSession<T>;

    /// Fails with `ResourceAcquisition` when no session can be obtained
    async fn create_session(
        &self,
        properties: &BTreeMap<String, String>,
    ) -> ReaderResult<Self::Session>;
}

/// Replaces the default composite-key query of the transactional reader.
///
/// `lower_bound` maps each key placeholder (`last_id`, `last_<column>`) to its
/// value for the page being read.
pub trait QueryProvider: Send + Sync {
    fn create_query(&self, operator: ComparisonOperator, lower_bound: &QueryParameters) -> NamedQuery;
}
