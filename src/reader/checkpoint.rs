//! Execution-context checkpointing.
//!
//! Readers that save state write their cursor into an [`ExecutionContext`] when
//! the host commits a chunk, and restore it on the next `open`. Readers that do
//! not save state always restart from the first page.

use crate::error::{ReaderError, ReaderResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Durable key/value state handed to readers by the host on open and commit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    entries: BTreeMap<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Read and deserialize the value stored under `key`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> ReaderResult<Option<T>> {
        self.entries
            .get(key)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| {
                    ReaderError::checkpoint(format!("cannot decode '{key}': {e}"))
                })
            })
            .transpose()
    }

    /// Serialize and store `value` under `key`
    pub fn put<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> ReaderResult<()> {
        let key = key.into();
        let value = serde_json::to_value(value)
            .map_err(|e| ReaderError::checkpoint(format!("cannot encode '{key}': {e}")))?;
        self.entries.insert(key, value);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Copy every entry of `other` into this context, overwriting duplicates
    pub fn merge(&mut self, other: &ExecutionContext) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Key under which a reader stores its last cursor
pub fn cursor_key(reader_name: &str) -> String {
    format!("{reader_name}.last_cursor")
}

/// Key under which the item reader stores how many items it has handed out
pub fn read_count_key(reader_name: &str) -> String {
    format!("{reader_name}.read.count")
}

/// Key under which the item reader stores items consumed from a partially read page
pub fn page_skip_key(reader_name: &str) -> String {
    format!("{reader_name}.read.skip")
}
