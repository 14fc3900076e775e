//! Relational store access with actor pattern
//!
//! StoreManager owns the SpendStore and processes commands via channels. The
//! agents only see it through the `SqlExecutor` and `SchemaSource` traits.

mod manager;
mod messages;
mod service;

pub use manager::StoreManager;
pub use messages::{StoreCommand, StoreManagerError, StoreResponse};
pub use service::{SchemaSource, SqlExecutor, SqlOutcome};
