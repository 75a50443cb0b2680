#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Keyset Reader
//!
//! Keyset (cursor-based) paging readers for streaming large database result
//! sets through batch jobs.
//!
//! ## Overview
//!
//! OFFSET pagination degrades as the offset grows and skips or duplicates rows
//! when the table changes between pages. The readers in this crate anchor every
//! page on the cursor of the last row of the previous page instead: the first
//! page is read with an inclusive (or absent) lower bound, every later page
//! with a strict `>` bound, and each page is capped with LIMIT.
//!
//! ## Module Organization
//!
//! - [`reader`] - Paging readers, cursor state machine and restart checkpoints
//! - [`backends`] - In-memory and PostgreSQL implementations of the data-source traits
//! - [`query_builder`] - Page query construction and named parameters
//! - [`models`] - Row types read by the readers
//! - [`database`] - Connection pooling
//! - [`config`] - Layered YAML/environment configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keyset_reader::backends::PgSessionFactory;
//! use keyset_reader::config::ConfigManager;
//! use keyset_reader::database::DatabaseConnection;
//! use keyset_reader::models::AuthorizationRecord;
//! use keyset_reader::reader::{ExecutionContext, PageReader, TransactionalKeysetReader};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let db = DatabaseConnection::connect(&manager.config().database).await?;
//!
//! let factory = PgSessionFactory::<AuthorizationRecord>::new(db.pool().clone());
//! let mut reader = TransactionalKeysetReader::builder(factory)
//!     .page_size(500)
//!     .build()?;
//!
//! reader.open(&ExecutionContext::new()).await?;
//! loop {
//!     let page = reader.read_page().await?;
//!     if page.is_empty() {
//!         break;
//!     }
//!     // process the page
//! }
//! reader.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test                                   # Unit, integration and property tests
//! DATABASE_URL=postgres://... cargo test -- --ignored   # PostgreSQL tests
//! ```

pub mod backends;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod query_builder;
pub mod reader;

pub use config::{ConfigManager, DatabaseConfig, ReaderConfig};
pub use error::{ReaderError, ReaderResult};
pub use reader::{
    ComparisonOperator, CursorState, ExecutionContext, KeysetPagingReader, PageReader,
    PagingItemReader, ReaderLifecycle, TransactionalKeysetReader,
};
