//! PostgreSQL backend on SQLx.
//!
//! [`PgQueryExecutor`] runs [`QueryBuilder`] page queries for the generic
//! keyset reader. [`PgSessionFactory`] opens [`PgSession`]s for the
//! transactional reader, one database transaction per page.
//!
//! SQLx decodes rows into owned values, so there is no persistence cache to
//! flush, clear or detach from; the session keeps a count of rows handed out
//! in the current unit of work and those calls adjust it.
//!
//! Session properties are applied with `set_config`: transaction-local inside
//! each page transaction, and once per session on a dedicated connection for
//! non-transacted reads. That connection is closed rather than returned to the
//! pool so its settings never reach other pool users.

use crate::error::{ReaderError, ReaderResult};
use crate::query_builder::{bind_values, Pagination, QueryBuilder};
use crate::reader::traits::{PageRequest, QueryContext, QueryExecutor, ReaderSession, SessionFactory};
use crate::reader::transactional::CompositeKeyEntity;
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Connection, FromRow, PgPool, Postgres, Transaction};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use tracing::{debug, warn};

/// [`QueryExecutor`] running [`QueryBuilder`] queries on a pool
#[derive(Debug, Clone)]
pub struct PgQueryExecutor {
    pool: PgPool,
}

impl PgQueryExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl QueryContext for PgQueryExecutor {
    type Query = QueryBuilder;
}

#[async_trait]
impl<T> QueryExecutor<T> for PgQueryExecutor
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin + 'static,
{
    async fn fetch_page(&self, query: QueryBuilder, page_size: u32) -> ReaderResult<Vec<T>> {
        let query = query.limit(page_size);
        debug!(sql = %query.build_sql(), "Executing keyset page query");
        query.fetch_all(&self.pool).await
    }
}

/// Opens [`PgSession`]s on a pool
#[derive(Debug, Clone)]
pub struct PgSessionFactory<T> {
    pool: PgPool,
    _row: PhantomData<fn() -> T>,
}

impl<T> PgSessionFactory<T> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _row: PhantomData,
        }
    }
}

#[async_trait]
impl<T> SessionFactory<T> for PgSessionFactory<T>
where
    T: CompositeKeyEntity + for<'r> FromRow<'r, PgRow> + Send + Unpin + 'static,
{
    type Session = PgSession<T>;

    async fn create_session(&self, properties: &BTreeMap<String, String>) -> ReaderResult<PgSession<T>> {
        // Prove a connection can be acquired before the reader reports itself open
        let connection = self.pool.acquire().await.map_err(|e| {
            ReaderError::resource_acquisition(format!("cannot acquire connection: {e}"))
        })?;
        drop(connection);

        Ok(PgSession {
            pool: self.pool.clone(),
            properties: properties.clone(),
            transaction: None,
            connection: None,
            managed: 0,
            _row: PhantomData,
        })
    }
}

/// A session over a pool with at most one open transaction
pub struct PgSession<T> {
    pool: PgPool,
    properties: BTreeMap<String, String>,
    transaction: Option<Transaction<'static, Postgres>>,
    /// Configured connection for reads outside a transaction
    connection: Option<PoolConnection<Postgres>>,
    managed: usize,
    _row: PhantomData<fn() -> T>,
}

impl<T> PgSession<T> {
    /// Rows handed out since the last clear
    pub fn managed_rows(&self) -> usize {
        self.managed
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// The session's own connection, acquired and configured on first use
    async fn configured_connection(&mut self) -> ReaderResult<&mut PoolConnection<Postgres>> {
        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => {
                let mut connection = self.pool.acquire().await.map_err(|e| {
                    ReaderError::resource_acquisition(format!("cannot acquire connection: {e}"))
                })?;
                apply_properties(&mut connection, &self.properties, false).await?;
                connection
            }
        };
        Ok(self.connection.insert(connection))
    }
}

/// `set_config` every property; `is_local` limits them to the current transaction
async fn apply_properties(
    connection: &mut PgConnection,
    properties: &BTreeMap<String, String>,
    is_local: bool,
) -> ReaderResult<()> {
    for (name, value) in properties {
        sqlx::query("SELECT set_config($1, $2, $3)")
            .bind(name)
            .bind(value)
            .bind(is_local)
            .execute(&mut *connection)
            .await
            .map_err(|e| ReaderError::transaction("set_config", format!("{name}: {e}")))?;
    }
    Ok(())
}

#[async_trait]
impl<T> ReaderSession<T> for PgSession<T>
where
    T: CompositeKeyEntity + for<'r> FromRow<'r, PgRow> + Send + Unpin + 'static,
{
    async fn begin(&mut self) -> ReaderResult<()> {
        if self.transaction.is_some() {
            return Err(ReaderError::transaction("begin", "transaction already active"));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ReaderError::transaction("begin", e.to_string()))?;

        apply_properties(&mut tx, &self.properties, true).await?;

        self.transaction = Some(tx);
        Ok(())
    }

    async fn flush(&mut self) -> ReaderResult<()> {
        Ok(())
    }

    fn clear(&mut self) {
        self.managed = 0;
    }

    async fn fetch(&mut self, request: &PageRequest<'_, T::Key>) -> ReaderResult<Vec<T>> {
        let compiled = request.query.compile()?;
        let sql = format!("{}{}", compiled.sql, Pagination::new(request.page_size).to_sql());
        debug!(sql = %sql, operator = %request.operator, lower_bound = ?request.lower_bound, "Executing page query");

        let query = bind_values(sqlx::query_as::<_, T>(&sql), &compiled.values)?;
        let rows = match self.transaction.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await?,
            None => {
                let connection = self.configured_connection().await?;
                query.fetch_all(&mut **connection).await?
            }
        };

        self.managed += rows.len();
        Ok(rows)
    }

    fn detach(&mut self, _row: &T) {
        self.managed = self.managed.saturating_sub(1);
    }

    async fn commit(&mut self) -> ReaderResult<()> {
        let tx = self
            .transaction
            .take()
            .ok_or_else(|| ReaderError::transaction("commit", "no active transaction"))?;
        tx.commit()
            .await
            .map_err(|e| ReaderError::transaction("commit", e.to_string()))
    }

    async fn rollback(&mut self) -> ReaderResult<()> {
        match self.transaction.take() {
            Some(tx) => tx
                .rollback()
                .await
                .map_err(|e| ReaderError::transaction("rollback", e.to_string())),
            None => Ok(()),
        }
    }

    async fn close(&mut self) -> ReaderResult<()> {
        if self.transaction.is_some() {
            warn!("Closing session with an open transaction; rolling back");
            self.rollback().await?;
        }
        if let Some(connection) = self.connection.take() {
            connection
                .detach()
                .close()
                .await
                .map_err(|e| ReaderError::transaction("close", e.to_string()))?;
        }
        self.managed = 0;
        Ok(())
    }
}
