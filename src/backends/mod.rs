//! # Backends
//!
//! Data-source implementations of the reader collaborator traits.
//!
//! - [`memory`] - Shared in-memory tables, used by tests and benchmarks
//! - [`postgres`] - SQLx on PostgreSQL

pub mod memory;
pub mod postgres;

pub use memory::{
    MemoryExecutor, MemoryQuery, MemorySession, MemorySessionFactory, MemoryTable, SessionEvent,
};
pub use postgres::{PgQueryExecutor, PgSession, PgSessionFactory};
