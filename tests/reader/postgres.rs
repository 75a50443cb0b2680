//! PostgreSQL-backed reader tests. Run with
//! `DATABASE_URL=postgres://... cargo test -- --ignored`.

use crate::common::{authorization, key, request_id, AuthorizationBuilder};
use keyset_reader::backends::{PgQueryExecutor, PgSessionFactory};
use keyset_reader::config::DatabaseConfig;
use keyset_reader::database::DatabaseConnection;
use keyset_reader::models::{AuthorizationKey, AuthorizationRecord};
use keyset_reader::query_builder::QueryBuilder;
use keyset_reader::reader::{
    CompositeKeyEntity, ExecutionContext, KeysetPagingReader, PageReader, TransactionalKeysetReader,
};
use serde_json::json;

async fn connect_with_fixture(count: u64) -> DatabaseConnection {
    let config = DatabaseConfig {
        url: Some("${DATABASE_URL}".to_string()),
        ..DatabaseConfig::default()
    };
    let db = DatabaseConnection::connect(&config).await.unwrap();
    AuthorizationRecord::create_table(db.pool()).await.unwrap();
    sqlx::query("TRUNCATE authorizations")
        .execute(db.pool())
        .await
        .unwrap();
    for n in 0..count {
        authorization(&request_id(n)).insert(db.pool()).await.unwrap();
    }
    db
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_transactional_reader_reads_table_once() {
    let db = connect_with_fixture(25).await;
    assert!(db.health_check().await.unwrap());
    assert_eq!(AuthorizationRecord::count(db.pool()).await.unwrap(), 25);

    let mut reader = TransactionalKeysetReader::builder(PgSessionFactory::<AuthorizationRecord>::new(db.pool().clone()))
        .page_size(10)
        .session_property("application_name", "keyset-reader-tests")
        .build()
        .unwrap();
    reader.open(&ExecutionContext::new()).await.unwrap();

    let mut seen = Vec::new();
    loop {
        let page = reader.read_page().await.unwrap();
        assert!(page.len() <= 10);
        if page.is_empty() {
            break;
        }
        seen.extend(page.iter().map(CompositeKeyEntity::cursor_value));
    }
    reader.close().await.unwrap();

    let expected: Vec<String> = (0..25).map(request_id).collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_keyset_reader_on_query_builder() {
    let db = connect_with_fixture(7).await;

    let mut reader: KeysetPagingReader<AuthorizationRecord, String, _, _, _> = KeysetPagingReader::new(
        PgQueryExecutor::new(db.pool().clone()),
        |_: &PgQueryExecutor, last: Option<&String>| {
            let query = QueryBuilder::new("authorizations").order_asc("trans_request_id");
            match last {
                Some(last) => query.where_gt("trans_request_id", json!(last)),
                None => query,
            }
        },
        |row: &AuthorizationRecord| row.cursor_value(),
        3,
    )
    .unwrap();
    reader.open(&ExecutionContext::new()).await.unwrap();

    let mut sizes = Vec::new();
    loop {
        let page = reader.read_page().await.unwrap();
        if page.is_empty() {
            break;
        }
        sizes.push(page.len());
    }
    assert_eq!(sizes, vec![3, 3, 1]);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_shared_request_id_is_read_in_full() {
    let db = connect_with_fixture(0).await;
    for (id, seq) in [("20240101000001", 2), ("20240101000002", 1), ("20240101000001", 1)] {
        AuthorizationBuilder::new(id)
            .approval_seq(seq)
            .build()
            .insert(db.pool())
            .await
            .unwrap();
    }

    let mut reader = TransactionalKeysetReader::builder(PgSessionFactory::<AuthorizationRecord>::new(db.pool().clone()))
        .page_size(1)
        .build()
        .unwrap();
    reader.open(&ExecutionContext::new()).await.unwrap();

    let mut keys: Vec<AuthorizationKey> = Vec::new();
    loop {
        let page = reader.read_page().await.unwrap();
        if page.is_empty() {
            break;
        }
        keys.extend(page.into_iter().map(|row| row.key));
    }
    reader.close().await.unwrap();

    assert_eq!(
        keys,
        vec![
            key("20240101000001", 1),
            key("20240101000001", 2),
            key("20240101000002", 1),
        ]
    );
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_session_properties_apply_without_transactions() {
    let db = connect_with_fixture(4).await;

    // Rows are only visible when the session property reached the connection
    let mut reader = TransactionalKeysetReader::builder(PgSessionFactory::<AuthorizationRecord>::new(db.pool().clone()))
        .query_string(
            "SELECT * FROM authorizations \
             WHERE (trans_request_id, approval_seq) {operator} (:last_id, :last_approval_seq) \
             AND current_setting('keyset.batch', true) = 'nightly' \
             ORDER BY trans_request_id, approval_seq",
        )
        .session_property("keyset.batch", "nightly")
        .transacted(false)
        .page_size(3)
        .build()
        .unwrap();
    reader.open(&ExecutionContext::new()).await.unwrap();

    assert_eq!(reader.read_page().await.unwrap().len(), 3);
    assert_eq!(reader.read_page().await.unwrap().len(), 1);
    assert!(reader.read_page().await.unwrap().is_empty());
    reader.close().await.unwrap();

    // The configured connection is not handed back to the pool
    let leaked: Option<String> = sqlx::query_scalar("SELECT current_setting('keyset.batch', true)")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_ne!(leaked.as_deref(), Some("nightly"));
}
