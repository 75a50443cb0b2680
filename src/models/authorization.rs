use crate::reader::transactional::CompositeKeyEntity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

/// Composite primary key of an authorization row.
/// `trans_request_id` is a fixed-width, lexicographically ordered request id
/// such as `20240101000042`; one request can carry several approvals.
/// Field order drives the derived `Ord` and must match the key columns.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, FromRow)]
pub struct AuthorizationKey {
    pub trans_request_id: String,
    pub approval_seq: i32,
}

/// Authorization represents one approved payment authorization
/// Maps to `authorizations` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AuthorizationRecord {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub key: AuthorizationKey,
    pub merchant_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub approved_at: DateTime<Utc>,
}

impl CompositeKeyEntity for AuthorizationRecord {
    type Key = AuthorizationKey;

    const TABLE: &'static str = "authorizations";

    const KEY_COLUMNS: &'static [&'static str] = &["trans_request_id", "approval_seq"];

    fn key(&self) -> &AuthorizationKey {
        &self.key
    }

    fn sentinel_key(cursor: &str) -> AuthorizationKey {
        AuthorizationKey {
            trans_request_id: cursor.to_string(),
            approval_seq: i32::MIN,
        }
    }

    fn key_values(key: &AuthorizationKey) -> Vec<Value> {
        vec![
            Value::from(key.trans_request_id.as_str()),
            Value::from(key.approval_seq),
        ]
    }

    fn cursor_value(&self) -> String {
        self.key.trans_request_id.clone()
    }
}

impl AuthorizationRecord {
    /// Create the `authorizations` table if it does not exist
    pub async fn create_table(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS authorizations (
                trans_request_id VARCHAR(14) NOT NULL,
                approval_seq INTEGER NOT NULL,
                merchant_id TEXT NOT NULL,
                amount_minor BIGINT NOT NULL,
                currency CHAR(3) NOT NULL,
                status TEXT NOT NULL,
                approved_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (trans_request_id, approval_seq)
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Insert this authorization
    pub async fn insert(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO authorizations
                (trans_request_id, approval_seq, merchant_id, amount_minor, currency, status, approved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&self.key.trans_request_id)
        .bind(self.key.approval_seq)
        .bind(&self.merchant_id)
        .bind(self.amount_minor)
        .bind(&self.currency)
        .bind(&self.status)
        .bind(self.approved_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Count all authorizations
    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM authorizations")
            .fetch_one(pool)
            .await?;

        Ok(count.0)
    }
}
