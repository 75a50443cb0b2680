//! # Database Connections
//!
//! Pool construction for the PostgreSQL backend.
//!
//! ```rust,no_run
//! use keyset_reader::config::DatabaseConfig;
//! use keyset_reader::database::DatabaseConnection;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = DatabaseConnection::connect(&DatabaseConfig::default()).await?;
//! assert!(db.health_check().await?);
//! # Ok(())
//! # }
//! ```

pub mod connection;

pub use connection::DatabaseConnection;
