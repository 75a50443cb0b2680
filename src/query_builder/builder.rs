use super::parameters::bind_values;
use super::{Pagination, WhereClause};
use crate::error::ReaderResult;
use sqlx::PgPool;

/// Fluent SELECT builder for page queries.
///
/// Literal conditions are rendered inline; cursor values go through
/// [`QueryBuilder::where_bound`] and are sent as positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBuilder {
    base_table: String,
    where_clauses: Vec<WhereClause>,
    order_by: Vec<String>,
    pagination: Option<Pagination>,
    parameters: Vec<serde_json::Value>,
}

impl QueryBuilder {
    /// Create a new query builder for the given table
    pub fn new(table: &str) -> Self {
        Self {
            base_table: table.to_string(),
            where_clauses: Vec::new(),
            order_by: Vec::new(),
            pagination: None,
            parameters: Vec::new(),
        }
    }

    /// Add a WHERE clause
    pub fn where_clause(mut self, clause: WhereClause) -> Self {
        self.where_clauses.push(clause);
        self
    }

    /// Add a comparison whose value is sent as a bound parameter
    pub fn where_bound(mut self, field: &str, operator: &str, value: serde_json::Value) -> Self {
        self.parameters.push(value);
        let position = self.parameters.len();
        self.where_clause(WhereClause::bound(field, operator, position))
    }

    /// Add `field > value` as a bound parameter
    pub fn where_gt(self, field: &str, value: serde_json::Value) -> Self {
        self.where_bound(field, ">", value)
    }

    /// Add `field >= value` as a bound parameter
    pub fn where_gte(self, field: &str, value: serde_json::Value) -> Self {
        self.where_bound(field, ">=", value)
    }

    /// Add ORDER BY ASC
    pub fn order_asc(mut self, field: &str) -> Self {
        self.order_by.push(format!("{field} ASC"));
        self
    }

    /// Cap the result at `limit` rows
    pub fn limit(mut self, limit: u32) -> Self {
        self.pagination = Some(Pagination::new(limit));
        self
    }

    /// Values bound to `$1..$n`, in order
    pub fn parameters(&self) -> &[serde_json::Value] {
        &self.parameters
    }

    /// Build the complete SQL query string
    pub fn build_sql(&self) -> String {
        let mut sql = format!("SELECT * FROM {}", self.base_table);

        if !self.where_clauses.is_empty() {
            sql.push_str(" WHERE ");
            let where_parts: Vec<String> = self
                .where_clauses
                .iter()
                .map(|clause| clause.to_sql())
                .collect();
            sql.push_str(&where_parts.join(" AND "));
        }

        if !self.order_by.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", self.order_by.join(", ")));
        }

        if let Some(ref pagination) = self.pagination {
            sql.push_str(&pagination.to_sql());
        }

        sql
    }

    /// Execute the query and return all rows
    pub async fn fetch_all<T>(&self, pool: &PgPool) -> ReaderResult<Vec<T>>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        let sql = self.build_sql();
        let rows = bind_values(sqlx::query_as::<_, T>(&sql), &self.parameters)?
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }
}
