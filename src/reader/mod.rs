//! # Keyset Paging Readers
//!
//! Readers that stream an arbitrarily large, ordered result set in bounded
//! pages without OFFSET. Each page query is anchored on the cursor of the last
//! row of the previous page, so per-page cost stays flat and rows inserted
//! behind the cursor never shift later pages.
//!
//! ## Key Components
//!
//! - [`keyset`] - Generic reader over pluggable query builder, executor and cursor extractor
//! - [`transactional`] - Composite-key entity reader with one transaction per page
//! - [`item_reader`] - One-item-at-a-time adapter with restart support
//! - [`state`] - Cursor and lifecycle state machines
//! - [`checkpoint`] - Restart state exchanged with the host
//! - [`traits`] - Reader and collaborator contracts

pub mod checkpoint;
pub mod item_reader;
pub mod keyset;
pub mod state;
pub mod traits;
pub mod transactional;

pub use checkpoint::ExecutionContext;
pub use item_reader::PagingItemReader;
pub use keyset::{CursorKey, KeysetPagingReader};
pub use state::{ComparisonOperator, CursorState, ReaderLifecycle};
pub use traits::{
    CursorExtractor, PageQueryBuilder, PageReader, PageRequest, QueryContext, QueryExecutor,
    QueryProvider, ReaderSession, SessionFactory,
};
pub use transactional::{
    key_parameter_names, CompositeKeyEntity, TransactionalKeysetReader,
    TransactionalKeysetReaderBuilder, LAST_ID_PARAMETER,
};
