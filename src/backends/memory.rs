//! In-memory backend.
//!
//! A shared row table plus executor and session implementations that apply the
//! same keyset semantics as the SQL backend. Sessions record every
//! demarcation call so transaction boundaries can be asserted on.

use crate::error::{ReaderError, ReaderResult};
use crate::query_builder::QueryParameters;
use crate::reader::state::ComparisonOperator;
use crate::reader::traits::{
    PageRequest, QueryContext, QueryExecutor, ReaderSession, SessionFactory,
};
use crate::reader::transactional::CompositeKeyEntity;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use tracing::debug;

/// Rows shared between a test and the readers observing them
#[derive(Debug)]
pub struct MemoryTable<R> {
    rows: Arc<RwLock<Vec<R>>>,
}

impl<R> Clone for MemoryTable<R> {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
        }
    }
}

impl<R> Default for MemoryTable<R> {
    fn default() -> Self {
        Self {
            rows: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl<R: Clone> MemoryTable<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, row: R) {
        self.rows.write().push(row);
    }

    pub fn extend(&self, rows: impl IntoIterator<Item = R>) {
        self.rows.write().extend(rows);
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Copy of the current rows in insertion order
    pub fn snapshot(&self) -> Vec<R> {
        self.rows.read().clone()
    }
}

type Predicate<R> = Arc<dyn Fn(&R) -> bool + Send + Sync>;
type Comparator<R> = Arc<dyn Fn(&R, &R) -> Ordering + Send + Sync>;

/// Filter and ordering applied to a [`MemoryTable`]
pub struct MemoryQuery<R> {
    filters: Vec<Predicate<R>>,
    order: Option<Comparator<R>>,
}

impl<R> Default for MemoryQuery<R> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            order: None,
        }
    }
}

impl<R> Clone for MemoryQuery<R> {
    fn clone(&self) -> Self {
        Self {
            filters: self.filters.clone(),
            order: self.order.clone(),
        }
    }
}

impl<R> fmt::Debug for MemoryQuery<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryQuery")
            .field("filters", &self.filters.len())
            .field("ordered", &self.order.is_some())
            .finish()
    }
}

impl<R> MemoryQuery<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only rows matching `predicate`
    pub fn filter(mut self, predicate: impl Fn(&R) -> bool + Send + Sync + 'static) -> Self {
        self.filters.push(Arc::new(predicate));
        self
    }

    /// Order ascending by the key `key_fn` projects
    pub fn order_by_key<K: Ord>(mut self, key_fn: impl Fn(&R) -> K + Send + Sync + 'static) -> Self {
        self.order = Some(Arc::new(move |a, b| key_fn(a).cmp(&key_fn(b))));
        self
    }

    pub fn matches(&self, row: &R) -> bool {
        self.filters.iter().all(|predicate| predicate(row))
    }

    /// Filter, sort and cap `rows`
    pub fn apply(&self, rows: Vec<R>, limit: usize) -> Vec<R> {
        let mut rows: Vec<R> = rows.into_iter().filter(|row| self.matches(row)).collect();
        if let Some(order) = &self.order {
            rows.sort_by(|a, b| order(a, b));
        }
        rows.truncate(limit);
        rows
    }
}

/// [`QueryExecutor`] over a [`MemoryTable`]
pub struct MemoryExecutor<R> {
    table: MemoryTable<R>,
    pending_failure: Mutex<Option<String>>,
    fetches: AtomicUsize,
}

impl<R: Clone> MemoryExecutor<R> {
    pub fn new(table: MemoryTable<R>) -> Self {
        Self {
            table,
            pending_failure: Mutex::new(None),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn table(&self) -> &MemoryTable<R> {
        &self.table
    }

    /// Make the next fetch fail with a query error
    pub fn fail_next_fetch(&self, message: impl Into<String>) {
        *self.pending_failure.lock() = Some(message.into());
    }

    /// Number of successful fetches
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(AtomicOrdering::SeqCst)
    }
}

impl<R: Send + Sync + 'static> QueryContext for MemoryExecutor<R> {
    type Query = MemoryQuery<R>;
}

#[async_trait]
impl<R> QueryExecutor<R> for MemoryExecutor<R>
where
    R: Clone + Send + Sync + 'static,
{
    async fn fetch_page(&self, query: MemoryQuery<R>, page_size: u32) -> ReaderResult<Vec<R>> {
        if let Some(message) = self.pending_failure.lock().take() {
            return Err(ReaderError::query("fetch_page", message));
        }
        let rows = query.apply(self.table.snapshot(), page_size as usize);
        self.fetches.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(rows)
    }
}

/// Session call recorded by [`MemorySessionFactory`]
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Opened { properties: BTreeMap<String, String> },
    Begin,
    Flush,
    Clear,
    Fetch {
        operator: ComparisonOperator,
        /// Key column values of the lower bound
        lower_bound: Vec<Value>,
        parameters: QueryParameters,
        rows: usize,
    },
    Detach,
    Commit,
    Rollback,
    Closed,
}

type ParameterFilter<R> = Arc<dyn Fn(&R, &QueryParameters) -> bool + Send + Sync>;

#[derive(Debug, Default)]
struct Faults {
    fetch: Option<String>,
    commit: Option<String>,
}

/// State shared by a factory and every session it opens
struct Shared<R> {
    table: MemoryTable<R>,
    parameter_filter: Option<ParameterFilter<R>>,
    events: Mutex<Vec<SessionEvent>>,
    faults: Mutex<Faults>,
    managed: AtomicUsize,
}

impl<R> Shared<R> {
    fn record(&self, event: SessionEvent) {
        self.events.lock().push(event);
    }
}

/// [`SessionFactory`] over a [`MemoryTable`] of [`CompositeKeyEntity`] rows
pub struct MemorySessionFactory<R> {
    shared: Arc<Shared<R>>,
    available: bool,
}

impl<R> Clone for MemorySessionFactory<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            available: self.available,
        }
    }
}

impl<R> MemorySessionFactory<R>
where
    R: CompositeKeyEntity + Clone + 'static,
{
    pub fn new(table: MemoryTable<R>) -> Self {
        Self {
            shared: Arc::new(Shared {
                table,
                parameter_filter: None,
                events: Mutex::new(Vec::new()),
                faults: Mutex::new(Faults::default()),
                managed: AtomicUsize::new(0),
            }),
            available: true,
        }
    }

    /// Apply the query's bound parameters to each row, standing in for the
    /// auxiliary predicates of a custom query
    pub fn with_parameter_filter(
        table: MemoryTable<R>,
        filter: impl Fn(&R, &QueryParameters) -> bool + Send + Sync + 'static,
    ) -> Self {
        let mut factory = Self::new(table);
        if let Some(shared) = Arc::get_mut(&mut factory.shared) {
            shared.parameter_filter = Some(Arc::new(filter));
        }
        factory
    }

    /// A factory whose sessions can never be obtained
    pub fn unavailable(table: MemoryTable<R>) -> Self {
        Self {
            available: false,
            ..Self::new(table)
        }
    }

    pub fn table(&self) -> &MemoryTable<R> {
        &self.shared.table
    }

    /// Every session call recorded so far
    pub fn events(&self) -> Vec<SessionEvent> {
        self.shared.events.lock().clone()
    }

    /// Rows currently tracked by open sessions
    pub fn managed_rows(&self) -> usize {
        self.shared.managed.load(AtomicOrdering::SeqCst)
    }

    pub fn fail_next_fetch(&self, message: impl Into<String>) {
        self.shared.faults.lock().fetch = Some(message.into());
    }

    pub fn fail_next_commit(&self, message: impl Into<String>) {
        self.shared.faults.lock().commit = Some(message.into());
    }
}

#[async_trait]
impl<R> SessionFactory<R> for MemorySessionFactory<R>
where
    R: CompositeKeyEntity + Clone + 'static,
{
    type Session = MemorySession<R>;

    async fn create_session(
        &self,
        properties: &BTreeMap<String, String>,
    ) -> ReaderResult<MemorySession<R>> {
        if !self.available {
            return Err(ReaderError::resource_acquisition(
                "memory session factory is unavailable",
            ));
        }
        self.shared.record(SessionEvent::Opened {
            properties: properties.clone(),
        });
        Ok(MemorySession {
            shared: Arc::clone(&self.shared),
            in_transaction: false,
            tracked: 0,
        })
    }
}

/// Session opened by [`MemorySessionFactory`]
pub struct MemorySession<R> {
    shared: Arc<Shared<R>>,
    in_transaction: bool,
    tracked: usize,
}

impl<R> MemorySession<R> {
    fn untrack(&mut self, count: usize) {
        let count = count.min(self.tracked);
        self.tracked -= count;
        self.shared.managed.fetch_sub(count, AtomicOrdering::SeqCst);
    }
}

#[async_trait]
impl<R> ReaderSession<R> for MemorySession<R>
where
    R: CompositeKeyEntity + Clone + 'static,
{
    async fn begin(&mut self) -> ReaderResult<()> {
        if self.in_transaction {
            return Err(ReaderError::transaction("begin", "transaction already active"));
        }
        self.in_transaction = true;
        self.shared.record(SessionEvent::Begin);
        Ok(())
    }

    async fn flush(&mut self) -> ReaderResult<()> {
        self.shared.record(SessionEvent::Flush);
        Ok(())
    }

    fn clear(&mut self) {
        self.untrack(self.tracked);
        self.shared.record(SessionEvent::Clear);
    }

    async fn fetch(&mut self, request: &PageRequest<'_, R::Key>) -> ReaderResult<Vec<R>> {
        // Same validation the SQL backend performs before binding
        request.query.compile()?;

        if let Some(message) = self.shared.faults.lock().fetch.take() {
            return Err(ReaderError::query("fetch", message));
        }

        let parameters = request.query.parameters();
        let mut rows: Vec<R> = self
            .shared
            .table
            .snapshot()
            .into_iter()
            .filter(|row| request.operator.admits(row.key(), request.lower_bound))
            .filter(|row| {
                self.shared
                    .parameter_filter
                    .as_ref()
                    .map_or(true, |filter| filter(row, parameters))
            })
            .collect();
        rows.sort_by(|a, b| a.key().cmp(b.key()));
        rows.truncate(request.page_size as usize);

        self.tracked += rows.len();
        self.shared.managed.fetch_add(rows.len(), AtomicOrdering::SeqCst);
        self.shared.record(SessionEvent::Fetch {
            operator: request.operator,
            lower_bound: R::key_values(request.lower_bound),
            parameters: parameters.clone(),
            rows: rows.len(),
        });
        debug!(rows = rows.len(), operator = %request.operator, "Memory session fetch");

        Ok(rows)
    }

    fn detach(&mut self, _row: &R) {
        self.untrack(1);
        self.shared.record(SessionEvent::Detach);
    }

    async fn commit(&mut self) -> ReaderResult<()> {
        if !self.in_transaction {
            return Err(ReaderError::transaction("commit", "no active transaction"));
        }
        self.in_transaction = false;
        if let Some(message) = self.shared.faults.lock().commit.take() {
            return Err(ReaderError::transaction("commit", message));
        }
        self.shared.record(SessionEvent::Commit);
        Ok(())
    }

    async fn rollback(&mut self) -> ReaderResult<()> {
        self.in_transaction = false;
        self.shared.record(SessionEvent::Rollback);
        Ok(())
    }

    async fn close(&mut self) -> ReaderResult<()> {
        if self.in_transaction {
            self.rollback().await?;
        }
        self.untrack(self.tracked);
        self.shared.record(SessionEvent::Closed);
        Ok(())
    }
}
