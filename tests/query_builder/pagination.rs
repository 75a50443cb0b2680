use keyset_reader::query_builder::pagination::Pagination;

#[test]
fn test_limit_only() {
    let pagination = Pagination::new(5);
    assert_eq!(pagination.limit, 5);
    assert_eq!(pagination.to_sql(), " LIMIT 5");
}

#[test]
fn test_is_full() {
    let pagination = Pagination::new(10);
    assert!(pagination.is_full(10));
    assert!(!pagination.is_full(9));
    assert!(!pagination.is_full(0));
}
