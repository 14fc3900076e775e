//! Store error types

use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Empty SQL statement")]
    EmptyStatement,

    #[error("Only read-only queries returning rows are allowed: {0}")]
    NotReadOnly(String),

    #[error("Invalid cart item '{0}': expected <product>=<quantity>")]
    InvalidCartItem(String),
}
