//! # Models
//!
//! Row types read by the paging readers.

pub mod authorization;

pub use authorization::{AuthorizationKey, AuthorizationRecord};
