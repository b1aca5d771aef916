//! Domain layer for the entity manager backend.
//!
//! This crate contains:
//! - Entity models and their capability declarations
//! - The restricted filter/sort/include query language
//! - Persistence ports (entity stores, user directory, clock)
//! - Generic list/read/write services, access policies and change tracking
//! - Account and content services
//! - An in-memory data context implementing every port (tests and the
//!   `test-support` feature only)

pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod models;
pub mod ports;
pub mod query;
pub mod services;

pub use error::{FieldViolation, ServiceError, StoreError};
