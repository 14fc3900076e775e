//! Store manager messages
//!
//! Commands and responses for the actor pattern.

use spendstore::{CartItem, CartQuote, Checkpoint, Schema, Table};
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreManagerError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Channel error")]
    ChannelError,
}

impl From<spendstore::StoreError> for StoreManagerError {
    fn from(e: spendstore::StoreError) -> Self {
        StoreManagerError::Store(e.to_string())
    }
}

/// Response from store operations
pub type StoreResponse<T> = Result<T, StoreManagerError>;

/// Commands sent to the StoreManager actor
#[derive(Debug)]
pub enum StoreCommand {
    Describe {
        reply: oneshot::Sender<StoreResponse<Schema>>,
    },
    Query {
        sql: String,
        reply: oneshot::Sender<StoreResponse<Table>>,
    },
    ExecuteScript {
        sql: String,
        reply: oneshot::Sender<StoreResponse<u64>>,
    },
    TableInfo {
        sample_rows: usize,
        reply: oneshot::Sender<StoreResponse<String>>,
    },
    SaveCheckpoint {
        thread_id: String,
        version: u64,
        state: String,
        reply: oneshot::Sender<StoreResponse<()>>,
    },
    LoadCheckpoint {
        thread_id: String,
        reply: oneshot::Sender<StoreResponse<Option<Checkpoint>>>,
    },
    PriceCart {
        items: Vec<CartItem>,
        reply: oneshot::Sender<StoreResponse<CartQuote>>,
    },
    Shutdown,
}
