use proptest::collection::btree_set;
use proptest::prelude::*;

/// Distinct cursor values, in no particular order
pub fn distinct_keys_strategy() -> impl Strategy<Value = Vec<i64>> {
    btree_set(-1_000i64..1_000, 0..60)
        .prop_map(|keys| keys.into_iter().collect::<Vec<_>>())
        .prop_shuffle()
}

/// Page sizes from a single row up to larger than most generated tables
pub fn page_size_strategy() -> impl Strategy<Value = u32> {
    1u32..25
}

/// Request-id sequence numbers for the composite-key reader
pub fn request_numbers_strategy() -> impl Strategy<Value = Vec<u64>> {
    btree_set(0u64..100_000, 0..40).prop_map(|numbers| numbers.into_iter().collect())
}

/// `(request number, approval sequence)` pairs; request numbers repeat often
pub fn approval_keys_strategy() -> impl Strategy<Value = Vec<(u64, i32)>> {
    btree_set((0u64..15, 1i32..4), 0..40)
        .prop_map(|keys| keys.into_iter().collect::<Vec<_>>())
        .prop_shuffle()
}
