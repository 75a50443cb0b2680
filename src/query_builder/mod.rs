//! # Query Builder System
//!
//! SQL construction for keyset page queries.
//!
//! ## Key Components
//!
//! - [`builder`] - Fluent SELECT builder with positional bound parameters
//! - [`conditions`] - WHERE clause building
//! - [`pagination`] - Keyset page bound (LIMIT only, never OFFSET)
//! - [`parameters`] - `:name` placeholder queries compiled to `$n`
//!
//! ## Example Usage
//!
//! ```rust
//! use keyset_reader::query_builder::QueryBuilder;
//! use serde_json::json;
//!
//! let query = QueryBuilder::new("job_postings")
//!     .where_gt("id", json!(1500))
//!     .order_asc("id")
//!     .limit(100);
//! assert_eq!(
//!     query.build_sql(),
//!     "SELECT * FROM job_postings WHERE id > $1 ORDER BY id ASC LIMIT 100"
//! );
//! ```

pub mod builder;
pub mod conditions;
pub mod pagination;
pub mod parameters;

pub use builder::QueryBuilder;
pub use conditions::{Condition, WhereClause};
pub use pagination::Pagination;
pub use parameters::{bind_values, CompiledQuery, NamedQuery, QueryParameters};
