//! Data models for the data-access layer.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod options;
pub mod value;

// Re-export commonly used types
pub use connection::{ConnectionDescriptor, DriverKind};
pub use options::{Condition, Conditions, Operator, Order, QueryOptions, SortDirection};
pub use value::Value;
