use crate::common::{approval_table, key, request_id, session_factory, AuthorizationBuilder};
use keyset_reader::backends::{MemorySessionFactory, MemoryTable, SessionEvent};
use keyset_reader::config::ReaderConfig;
use keyset_reader::models::{AuthorizationKey, AuthorizationRecord};
use keyset_reader::reader::{
    ComparisonOperator, CompositeKeyEntity, ExecutionContext, PageReader, ReaderLifecycle,
    TransactionalKeysetReader,
};
use keyset_reader::ReaderError;
use serde_json::{json, Value};

fn cursors(rows: &[AuthorizationRecord]) -> Vec<String> {
    rows.iter().map(CompositeKeyEntity::cursor_value).collect()
}

async fn read_all<R: PageReader<AuthorizationRecord>>(reader: &mut R) -> Vec<AuthorizationRecord> {
    let mut rows = Vec::new();
    loop {
        let page = reader.read_page().await.unwrap();
        if page.is_empty() {
            return rows;
        }
        rows.extend(page);
    }
}

#[tokio::test]
async fn test_row_at_minimum_cursor_is_included() {
    let factory = session_factory(&["00000000000000", "00000000000001"]);
    let mut reader = TransactionalKeysetReader::builder(factory.clone())
        .page_size(1)
        .build()
        .unwrap();
    reader.open(&ExecutionContext::new()).await.unwrap();

    let first = reader.read_page().await.unwrap();
    assert_eq!(cursors(&first), vec!["00000000000000"]);
    let second = reader.read_page().await.unwrap();
    assert_eq!(cursors(&second), vec!["00000000000001"]);

    let fetches: Vec<(ComparisonOperator, Vec<Value>)> = factory
        .events()
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::Fetch {
                operator,
                lower_bound,
                ..
            } => Some((operator, lower_bound)),
            _ => None,
        })
        .collect();
    assert_eq!(
        fetches,
        vec![
            (ComparisonOperator::GreaterOrEqual, vec![json!("00000000000000"), json!(i32::MIN)]),
            (ComparisonOperator::Greater, vec![json!("00000000000000"), json!(1)]),
        ]
    );
}

#[tokio::test]
async fn test_each_page_runs_in_its_own_transaction() {
    let ids: Vec<String> = (1..=5).map(request_id).collect();
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let factory = session_factory(&refs);
    let mut reader = TransactionalKeysetReader::builder(factory.clone())
        .page_size(2)
        .build()
        .unwrap();

    reader.open(&ExecutionContext::new()).await.unwrap();
    assert_eq!(read_all(&mut reader).await.len(), 5);
    reader.close().await.unwrap();

    let events = factory.events();
    let begins = events.iter().filter(|e| **e == SessionEvent::Begin).count();
    let commits = events.iter().filter(|e| **e == SessionEvent::Commit).count();
    // Three data pages plus the empty page
    assert_eq!(begins, 4);
    assert_eq!(commits, 4);

    // begin, flush, clear, fetch, commit for every page
    for window in events.windows(5).filter(|w| w[0] == SessionEvent::Begin) {
        assert_eq!(window[1], SessionEvent::Flush);
        assert_eq!(window[2], SessionEvent::Clear);
        assert!(matches!(window[3], SessionEvent::Fetch { .. }));
        assert_eq!(window[4], SessionEvent::Commit);
    }
    assert!(!events.contains(&SessionEvent::Detach));
    assert_eq!(events.last(), Some(&SessionEvent::Closed));
}

#[tokio::test]
async fn test_non_transacted_detaches_every_row() {
    let factory = session_factory(&["20240101000001", "20240101000002", "20240101000003"]);
    let mut reader = TransactionalKeysetReader::builder(factory.clone())
        .page_size(2)
        .transacted(false)
        .build()
        .unwrap();

    reader.open(&ExecutionContext::new()).await.unwrap();
    reader.read_page().await.unwrap();
    assert_eq!(factory.managed_rows(), 0);
    reader.read_page().await.unwrap();
    assert_eq!(factory.managed_rows(), 0);

    let events = factory.events();
    assert_eq!(events.iter().filter(|e| **e == SessionEvent::Detach).count(), 3);
    assert!(!events.contains(&SessionEvent::Begin));
}

#[tokio::test]
async fn test_auxiliary_parameters_apply_to_every_page() {
    let table = MemoryTable::new();
    for n in 1..=9 {
        let merchant = if n % 3 == 0 { "M-OTHER" } else { "M-1" };
        table.insert(AuthorizationBuilder::new(&request_id(n)).merchant(merchant).build());
    }
    let factory = MemorySessionFactory::with_parameter_filter(table, |row: &AuthorizationRecord, params| {
        params
            .get("merchant")
            .and_then(|value| value.as_str())
            .map_or(true, |merchant| row.merchant_id == merchant)
    });

    let mut reader = TransactionalKeysetReader::builder(factory.clone())
        .query_string(
            "SELECT * FROM authorizations WHERE trans_request_id {operator} :last_id AND merchant_id = :merchant ORDER BY trans_request_id ASC",
        )
        .parameter("merchant", json!("M-1"))
        .page_size(2)
        .build()
        .unwrap();

    reader.open(&ExecutionContext::new()).await.unwrap();
    let rows = read_all(&mut reader).await;

    assert_eq!(rows.len(), 6);
    assert!(rows.iter().all(|row| row.merchant_id == "M-1"));

    for event in factory.events() {
        if let SessionEvent::Fetch { parameters, .. } = event {
            assert_eq!(parameters.get("merchant"), Some(&json!("M-1")));
            assert!(parameters.contains_key("last_id"));
        }
    }
}

#[tokio::test]
async fn test_failed_fetch_rolls_back_and_keeps_cursor() {
    let factory = session_factory(&["20240101000001", "20240101000002", "20240101000003"]);
    let mut reader = TransactionalKeysetReader::builder(factory.clone())
        .page_size(1)
        .build()
        .unwrap();
    reader.open(&ExecutionContext::new()).await.unwrap();
    reader.read_page().await.unwrap();

    factory.fail_next_fetch("connection reset by peer");
    let err = reader.read_page().await.unwrap_err();
    assert!(matches!(err, ReaderError::Query { .. }));
    assert!(err.is_retryable());
    assert_eq!(
        reader.cursor_state().last_cursor(),
        Some(&key("20240101000001", 1))
    );
    assert!(factory.events().contains(&SessionEvent::Rollback));

    let retried = reader.read_page().await.unwrap();
    assert_eq!(cursors(&retried), vec!["20240101000002"]);
}

#[tokio::test]
async fn test_failed_commit_keeps_cursor() {
    let factory = session_factory(&["20240101000001", "20240101000002"]);
    let mut reader = TransactionalKeysetReader::builder(factory.clone())
        .page_size(1)
        .build()
        .unwrap();
    reader.open(&ExecutionContext::new()).await.unwrap();

    factory.fail_next_commit("serialization failure");
    let err = reader.read_page().await.unwrap_err();
    assert!(matches!(err, ReaderError::Transaction { .. }));
    assert!(reader.cursor_state().is_first_page());

    let rows = reader.read_page().await.unwrap();
    assert_eq!(cursors(&rows), vec!["20240101000001"]);
}

#[tokio::test]
async fn test_open_fails_when_no_session_available() {
    let factory = MemorySessionFactory::unavailable(MemoryTable::<AuthorizationRecord>::new());
    let mut reader = TransactionalKeysetReader::builder(factory).build().unwrap();

    let err = reader.open(&ExecutionContext::new()).await.unwrap_err();
    assert!(matches!(err, ReaderError::ResourceAcquisition { .. }));
    assert_eq!(reader.lifecycle(), ReaderLifecycle::Unopened);
}

#[tokio::test]
async fn test_session_properties_reach_the_factory() {
    let factory = session_factory(&[]);
    let mut reader = TransactionalKeysetReader::builder(factory.clone())
        .session_property("statement_timeout", "5s")
        .build()
        .unwrap();
    reader.open(&ExecutionContext::new()).await.unwrap();

    match &factory.events()[0] {
        SessionEvent::Opened { properties } => {
            assert_eq!(properties.get("statement_timeout").map(String::as_str), Some("5s"));
        }
        other => panic!("expected Opened, got {other:?}"),
    }
}

#[tokio::test]
async fn test_jump_to_page_does_not_move_cursor() {
    let factory = session_factory(&["20240101000001", "20240101000002", "20240101000003"]);
    let mut reader = TransactionalKeysetReader::builder(factory)
        .page_size(1)
        .build()
        .unwrap();
    reader.open(&ExecutionContext::new()).await.unwrap();
    reader.read_page().await.unwrap();

    reader.jump_to_page(0);
    reader.jump_to_page(42);

    let rows = reader.read_page().await.unwrap();
    assert_eq!(cursors(&rows), vec!["20240101000002"]);
}

#[tokio::test]
async fn test_from_config_with_saved_state() {
    let config = ReaderConfig {
        name: "authorizations".to_string(),
        page_size: 2,
        save_state: true,
        ..ReaderConfig::default()
    };
    let ids = ["20240101000001", "20240101000002", "20240101000003"];
    let mut context = ExecutionContext::new();

    let mut first = TransactionalKeysetReader::from_config(&config, session_factory(&ids)).unwrap();
    first.open(&context).await.unwrap();
    assert_eq!(first.read_page().await.unwrap().len(), 2);
    first.update(&mut context).unwrap();
    first.close().await.unwrap();

    assert_eq!(
        context.get::<AuthorizationKey>("authorizations.last_cursor").unwrap(),
        Some(key("20240101000002", 1))
    );

    let mut resumed = TransactionalKeysetReader::from_config(&config, session_factory(&ids)).unwrap();
    resumed.open(&context).await.unwrap();
    let rows = resumed.read_page().await.unwrap();
    assert_eq!(cursors(&rows), vec!["20240101000003"]);
}

#[tokio::test]
async fn test_shared_request_id_across_page_boundary_is_not_skipped() {
    let table = approval_table(&[
        ("20240101000001", 1),
        ("20240101000002", 1),
        ("20240101000001", 2),
        ("20240101000001", 3),
    ]);
    for transacted in [true, false] {
        let mut reader = TransactionalKeysetReader::builder(MemorySessionFactory::new(table.clone()))
            .page_size(1)
            .transacted(transacted)
            .build()
            .unwrap();
        reader.open(&ExecutionContext::new()).await.unwrap();

        let keys: Vec<AuthorizationKey> = read_all(&mut reader)
            .await
            .into_iter()
            .map(|row| row.key)
            .collect();
        assert_eq!(
            keys,
            vec![
                key("20240101000001", 1),
                key("20240101000001", 2),
                key("20240101000001", 3),
                key("20240101000002", 1),
            ]
        );
    }
}

#[tokio::test]
async fn test_saved_key_resumes_within_a_request_id() {
    let table = approval_table(&[("20240101000001", 1), ("20240101000001", 2), ("20240101000002", 1)]);
    let mut context = ExecutionContext::new();

    let mut first = TransactionalKeysetReader::builder(MemorySessionFactory::new(table.clone()))
        .name("approvals")
        .page_size(1)
        .save_state(true)
        .build()
        .unwrap();
    first.open(&context).await.unwrap();
    first.read_page().await.unwrap();
    first.update(&mut context).unwrap();
    first.close().await.unwrap();

    let mut resumed = TransactionalKeysetReader::builder(MemorySessionFactory::new(table))
        .name("approvals")
        .page_size(2)
        .save_state(true)
        .build()
        .unwrap();
    resumed.open(&context).await.unwrap();
    let rows = resumed.read_page().await.unwrap();
    let keys: Vec<&AuthorizationKey> = rows.iter().map(|row| &row.key).collect();
    assert_eq!(keys, vec![&key("20240101000001", 2), &key("20240101000002", 1)]);
}

#[tokio::test]
async fn test_unreadable_checkpoint_acquires_no_session() {
    let factory = session_factory(&["20240101000001"]);
    let mut reader = TransactionalKeysetReader::builder(factory.clone())
        .name("authorizations")
        .save_state(true)
        .build()
        .unwrap();

    let mut corrupt = ExecutionContext::new();
    corrupt.put("authorizations.last_cursor", &42u64).unwrap();
    let err = reader.open(&corrupt).await.unwrap_err();
    assert!(matches!(err, ReaderError::Checkpoint { .. }));
    assert_eq!(reader.lifecycle(), ReaderLifecycle::Unopened);
    assert!(factory.events().is_empty());

    reader.open(&ExecutionContext::new()).await.unwrap();
    reader.close().await.unwrap();

    let events = factory.events();
    let opened = events.iter().filter(|e| matches!(e, SessionEvent::Opened { .. })).count();
    let closed = events.iter().filter(|e| **e == SessionEvent::Closed).count();
    assert_eq!((opened, closed), (1, 1));
}

#[tokio::test]
async fn test_non_transacted_fetch_failure_keeps_cursor() {
    let factory = session_factory(&["20240101000001", "20240101000002"]);
    let mut reader = TransactionalKeysetReader::builder(factory.clone())
        .page_size(1)
        .transacted(false)
        .build()
        .unwrap();
    reader.open(&ExecutionContext::new()).await.unwrap();
    reader.read_page().await.unwrap();

    factory.fail_next_fetch("connection reset by peer");
    assert!(matches!(reader.read_page().await, Err(ReaderError::Query { .. })));
    assert_eq!(reader.cursor_state().last_cursor(), Some(&key("20240101000001", 1)));
    assert!(!factory.events().contains(&SessionEvent::Rollback));

    let rows = reader.read_page().await.unwrap();
    assert_eq!(cursors(&rows), vec!["20240101000002"]);
}
