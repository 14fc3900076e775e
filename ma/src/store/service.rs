//! Store-facing traits consumed by the agents

use async_trait::async_trait;
use spendstore::{Schema, Table};

use super::messages::StoreManagerError;

/// Outcome of executing one statement
///
/// Failures are data, never errors: the raw database message is kept so it
/// can be fed back to the model.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlOutcome {
    Rows(Table),
    Failed(String),
}

impl SqlOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, SqlOutcome::Rows(_))
    }
}

/// Executes SQL statements against the relational store
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> SqlOutcome;
}

/// Describes the tables available to the SQL worker
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn describe(&self) -> Result<Schema, StoreManagerError>;
}
