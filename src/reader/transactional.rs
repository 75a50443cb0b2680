//! # Transactional Keyset Reader
//!
//! Pages through one composite-key entity ordered by its cursor column. Each
//! page is read inside its own transaction (begin, flush, clear, query,
//! commit) so no transaction ever spans two pages. Outside transactional mode
//! every fetched row is detached from the session right away so a long read
//! does not accumulate tracked rows.
//!
//! The cursor is the entity's full composite key, compared as a row value
//! (`(trans_request_id, approval_seq) > (:last_id, :last_approval_seq)`), so
//! rows sharing a leading key column never straddle a page boundary unseen.
//! The first page uses `>=` against a sentinel key so a row whose key equals
//! the minimum is not missed; every later page uses `>` against the key of the
//! last row returned.

use super::checkpoint::{cursor_key, ExecutionContext};
use super::keyset::CursorKey;
use super::state::{CursorState, ReaderLifecycle};
use super::traits::{PageReader, PageRequest, QueryProvider, ReaderSession, SessionFactory};
use crate::config::{is_valid_parameter_name, ReaderConfig, DEFAULT_INITIAL_CURSOR, OPERATOR_TOKEN};
use crate::error::{ReaderError, ReaderResult};
use crate::logging;
use crate::query_builder::{NamedQuery, QueryParameters};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, info, warn};

/// Placeholder bound to the cursor column of the lower-bound key
pub const LAST_ID_PARAMETER: &str = "last_id";

/// An entity read by [`TransactionalKeysetReader`]: a table with a composite
/// primary key that orders the keyset.
///
/// `Key`'s `Ord` must agree with a lexicographic comparison of
/// [`Self::KEY_COLUMNS`] in the order listed.
pub trait CompositeKeyEntity: Send + Sync {
    type Key: CursorKey;

    const TABLE: &'static str;

    /// Primary key columns, most significant first. The first is the cursor column.
    const KEY_COLUMNS: &'static [&'static str];

    fn key(&self) -> &Self::Key;

    /// Smallest key whose cursor column equals `cursor`
    fn sentinel_key(cursor: &str) -> Self::Key;

    /// Values of `key`, in [`Self::KEY_COLUMNS`] order
    fn key_values(key: &Self::Key) -> Vec<Value>;

    /// Value of the cursor column
    fn cursor_value(&self) -> String;
}

/// Placeholder names of the lower-bound key: `last_id` for the cursor column,
/// `last_<column>` for the others
pub fn key_parameter_names<T: CompositeKeyEntity>() -> Vec<String> {
    T::KEY_COLUMNS
        .iter()
        .enumerate()
        .map(|(index, column)| match index {
            0 => LAST_ID_PARAMETER.to_string(),
            _ => format!("last_{column}"),
        })
        .collect()
}

/// `key` bound to its placeholder names
fn key_parameters<T: CompositeKeyEntity>(key: &T::Key) -> QueryParameters {
    key_parameter_names::<T>()
        .into_iter()
        .zip(T::key_values(key))
        .collect()
}

/// Where the page query comes from
enum QuerySource {
    /// `SELECT * FROM <table> WHERE (<key columns>) <op> (:last_id, ..) [AND (<filter>)] ORDER BY <key columns>`
    Default { filter: Option<String> },
    /// Custom SQL with an `{operator}` token
    Template(String),
    Provider(Box<dyn QueryProvider>),
}

impl fmt::Debug for QuerySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default { filter } => f.debug_struct("Default").field("filter", filter).finish(),
            Self::Template(sql) => f.debug_tuple("Template").field(sql).finish(),
            Self::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

/// Builder for [`TransactionalKeysetReader`]; all validation happens in `build`
pub struct TransactionalKeysetReaderBuilder<T, F> {
    factory: F,
    name: String,
    page_size: u32,
    transacted: bool,
    save_state: bool,
    initial_cursor: String,
    query_string: Option<String>,
    filter: Option<String>,
    provider: Option<Box<dyn QueryProvider>>,
    parameters: QueryParameters,
    session_properties: BTreeMap<String, String>,
    _row: PhantomData<fn() -> T>,
}

impl<T, F> TransactionalKeysetReaderBuilder<T, F>
where
    T: CompositeKeyEntity + 'static,
    F: SessionFactory<T>,
{
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            name: "transactional-keyset-reader".to_string(),
            page_size: 10,
            transacted: true,
            save_state: false,
            initial_cursor: DEFAULT_INITIAL_CURSOR.to_string(),
            query_string: None,
            filter: None,
            provider: None,
            parameters: QueryParameters::new(),
            session_properties: BTreeMap::new(),
            _row: PhantomData,
        }
    }

    /// Start from loaded configuration
    pub fn from_config(config: &ReaderConfig, factory: F) -> Self {
        Self {
            name: config.name.clone(),
            page_size: config.page_size,
            transacted: config.transacted,
            save_state: config.save_state,
            initial_cursor: config.initial_cursor.clone(),
            query_string: config.query_string.clone(),
            filter: config.filter.clone(),
            parameters: config.parameters.clone(),
            session_properties: config.session_properties.clone(),
            ..Self::new(factory)
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn transacted(mut self, transacted: bool) -> Self {
        self.transacted = transacted;
        self
    }

    pub fn save_state(mut self, save_state: bool) -> Self {
        self.save_state = save_state;
        self
    }

    /// Cursor-column value of the first-page sentinel key
    pub fn initial_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.initial_cursor = cursor.into();
        self
    }

    pub fn query_string(mut self, sql: impl Into<String>) -> Self {
        self.query_string = Some(sql.into());
        self
    }

    pub fn filter(mut self, predicate: impl Into<String>) -> Self {
        self.filter = Some(predicate.into());
        self
    }

    pub fn query_provider(mut self, provider: impl QueryProvider + 'static) -> Self {
        self.provider = Some(Box::new(provider));
        self
    }

    pub fn parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn parameters(mut self, parameters: QueryParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn session_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.session_properties.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> ReaderResult<TransactionalKeysetReader<T, F>> {
        const COMPONENT: &str = "transactional_keyset_reader";

        if self.page_size == 0 {
            return Err(ReaderError::configuration(
                COMPONENT,
                "page size must be greater than 0",
            ));
        }
        if self.initial_cursor.is_empty() {
            return Err(ReaderError::configuration(
                COMPONENT,
                "initial cursor must not be empty",
            ));
        }

        if T::KEY_COLUMNS.is_empty() {
            return Err(ReaderError::configuration(
                COMPONENT,
                format!("entity {} declares no key columns", T::TABLE),
            ));
        }

        let reserved = key_parameter_names::<T>();
        for name in self.parameters.keys() {
            if reserved.contains(name) {
                return Err(ReaderError::parameter(
                    name.clone(),
                    "reserved for the page cursor",
                ));
            }
            if !is_valid_parameter_name(name) {
                return Err(ReaderError::parameter(name.clone(), "not a valid identifier"));
            }
        }

        let query_source = match (self.provider, self.query_string, self.filter) {
            (Some(_), Some(_), _) => {
                return Err(ReaderError::configuration(
                    COMPONENT,
                    "set either a query string or a query provider, not both",
                ))
            }
            (Some(_), None, Some(_)) | (None, Some(_), Some(_)) => {
                return Err(ReaderError::configuration(
                    COMPONENT,
                    "filter applies only to the default query",
                ))
            }
            (Some(provider), None, None) => QuerySource::Provider(provider),
            (None, Some(sql), None) => {
                if !sql.contains(OPERATOR_TOKEN) {
                    return Err(ReaderError::configuration(
                        COMPONENT,
                        format!("query string must contain the {OPERATOR_TOKEN} token"),
                    ));
                }
                QuerySource::Template(sql)
            }
            (None, None, filter) => QuerySource::Default { filter },
        };

        Ok(TransactionalKeysetReader {
            sentinel: T::sentinel_key(&self.initial_cursor),
            name: self.name,
            page_size: self.page_size,
            transacted: self.transacted,
            save_state: self.save_state,
            query_source,
            parameters: self.parameters,
            session_properties: self.session_properties,
            factory: self.factory,
            session: None,
            state: CursorState::AwaitingFirstPage,
            lifecycle: ReaderLifecycle::Unopened,
            page: 0,
            _row: PhantomData,
        })
    }
}

/// Keyset reader with per-page transaction demarcation over a [`CompositeKeyEntity`]
pub struct TransactionalKeysetReader<T, F>
where
    T: CompositeKeyEntity,
    F: SessionFactory<T>,
{
    name: String,
    page_size: u32,
    transacted: bool,
    save_state: bool,
    sentinel: T::Key,
    query_source: QuerySource,
    parameters: QueryParameters,
    session_properties: BTreeMap<String, String>,
    factory: F,
    session: Option<F::Session>,
    state: CursorState<T::Key>,
    lifecycle: ReaderLifecycle,
    page: u32,
    _row: PhantomData<fn() -> T>,
}

impl<T, F> TransactionalKeysetReader<T, F>
where
    T: CompositeKeyEntity + 'static,
    F: SessionFactory<T>,
{
    pub fn builder(factory: F) -> TransactionalKeysetReaderBuilder<T, F> {
        TransactionalKeysetReaderBuilder::new(factory)
    }

    /// Build a reader straight from loaded configuration
    pub fn from_config(config: &ReaderConfig, factory: F) -> ReaderResult<Self> {
        TransactionalKeysetReaderBuilder::from_config(config, factory).build()
    }

    pub fn is_transacted(&self) -> bool {
        self.transacted
    }

    pub fn cursor_state(&self) -> &CursorState<T::Key> {
        &self.state
    }

    /// Number of pages fetched since open
    pub fn pages_read(&self) -> u32 {
        self.page
    }

    /// The query the next `read_page` will run, with all parameters bound
    pub fn create_query(&self) -> NamedQuery {
        let (operator, bound) = self.state.lower_bound(&self.sentinel);
        let bound = key_parameters::<T>(bound);

        let query = match &self.query_source {
            QuerySource::Default { filter } => {
                // Key column order, not the alphabetical order of `bound`
                let placeholders: Vec<String> = key_parameter_names::<T>()
                    .iter()
                    .map(|name| format!(":{name}"))
                    .collect();
                let predicate = match T::KEY_COLUMNS {
                    [column] => format!("{column} {operator} {}", placeholders.join(", ")),
                    columns => format!(
                        "({}) {operator} ({})",
                        columns.join(", "),
                        placeholders.join(", ")
                    ),
                };
                let mut sql = format!("SELECT * FROM {} WHERE {predicate}", T::TABLE);
                if let Some(filter) = filter {
                    sql.push_str(&format!(" AND ({filter})"));
                }
                let order: Vec<String> =
                    T::KEY_COLUMNS.iter().map(|column| format!("{column} ASC")).collect();
                sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
                NamedQuery::new(sql).with_parameters(&bound)
            }
            QuerySource::Template(template) => {
                let query = NamedQuery::new(template.replace(OPERATOR_TOKEN, operator.as_sql()));
                let referenced: Vec<_> = bound
                    .into_iter()
                    .filter(|(name, _)| query.references(name))
                    .collect();
                referenced
                    .into_iter()
                    .fold(query, |query, (name, value)| query.with_parameter(name, value))
            }
            QuerySource::Provider(provider) => provider.create_query(operator, &bound),
        };

        query.with_parameters(&self.parameters)
    }

    async fn fetch_in_transaction(
        session: &mut F::Session,
        request: &PageRequest<'_, T::Key>,
    ) -> ReaderResult<Vec<T>> {
        session.flush().await?;
        session.clear();
        session.fetch(request).await
    }
}

#[async_trait]
impl<T, F> PageReader<T> for TransactionalKeysetReader<T, F>
where
    T: CompositeKeyEntity + 'static,
    F: SessionFactory<T>,
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

        // Decode the checkpoint before acquiring anything that would need releasing
        let restored = if self.save_state {
            context.get::<T::Key>(&cursor_key(&self.name))?
        } else {
            None
        };

        let session = self
            .factory
            .create_session(&self.session_properties)
            .await
            .map_err(|e| match e {
                ReaderError::ResourceAcquisition { .. } => e,
                other => ReaderError::resource_acquisition(format!(
                    "unable to obtain a session: {other}"
                )),
            })?;
        self.session = Some(session);

        self.page = 0;
        self.state = match restored {
            Some(last) => {
                debug!(reader = %self.name, cursor = ?last, "Restoring saved cursor");
                CursorState::Streaming { last }
            }
            None => CursorState::AwaitingFirstPage,
        };
        self.lifecycle = ReaderLifecycle::Open;

        info!(
            reader = %self.name,
            entity = T::TABLE,
            page_size = self.page_size,
            transacted = self.transacted,
            resumed = !self.state.is_first_page(),
            "Reader opened"
        );
        Ok(())
    }

    async fn read_page(&mut self) -> ReaderResult<Vec<T>> {
        self.lifecycle.ensure_readable("read_page")?;

        let query = self.create_query();
        let (operator, lower_bound) = self.state.lower_bound(&self.sentinel);
        let request = PageRequest {
            query: &query,
            operator,
            lower_bound,
            page_size: self.page_size,
        };

        let session = self
            .session
            .as_mut()
            .ok_or_else(|| ReaderError::state("read_page", "no session is open"))?;

        let rows = if self.transacted {
            session.begin().await?;
            let rows = match Self::fetch_in_transaction(session, &request).await {
                Ok(rows) => rows,
                Err(error) => {
                    if let Err(rollback_error) = session.rollback().await {
                        warn!(reader = %self.name, error = %rollback_error, "Rollback after failed page fetch failed");
                    }
                    logging::log_error("transactional_keyset_reader", "read_page", &error.to_string(), Some(&self.name));
                    return Err(error);
                }
            };
            session.commit().await?;
            rows
        } else {
            let rows = match session.fetch(&request).await {
                Ok(rows) => rows,
                Err(error) => {
                    logging::log_error("transactional_keyset_reader", "read_page", &error.to_string(), Some(&self.name));
                    return Err(error);
                }
            };
            for row in &rows {
                session.detach(row);
            }
            rows
        };

        if let Some(last) = rows.last() {
            if let Err(error) = self.state.advance(last.key().clone()) {
                warn!(reader = %self.name, error = %error, "Rejecting page");
                return Err(error);
            }
        }
        self.lifecycle = ReaderLifecycle::after_page(rows.len());

        let cursor = self.state.last_cursor().map(|key| format!("{key:?}"));
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

        if let Some(mut session) = self.session.take() {
            session.close().await?;
        }

        info!(reader = %self.name, pages = self.page, "Reader closed");
        Ok(())
    }
}
