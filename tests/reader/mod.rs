//! Reader Tests Module
//!
//! Page sequencing, boundary handling, transaction demarcation and restart
//! behaviour of the keyset readers.

pub mod postgres;
pub mod transactional;
