//! StoreManager actor

use std::path::Path;

use async_trait::async_trait;
use spendstore::{CartItem, CartQuote, Checkpoint, Schema, SpendStore, Table};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::messages::{StoreCommand, StoreManagerError, StoreResponse};
use super::service::{SchemaSource, SqlExecutor, SqlOutcome};

/// Handle to send commands to the StoreManager
#[derive(Clone)]
pub struct StoreManager {
    tx: mpsc::Sender<StoreCommand>,
}

impl StoreManager {
    /// Spawn a new StoreManager actor over a database file
    pub fn spawn(db_path: impl AsRef<Path>) -> eyre::Result<Self> {
        debug!(db_path = %db_path.as_ref().display(), "spawn: called");
        let store = SpendStore::open(db_path.as_ref())?;
        store.initialize_schema()?;
        Ok(Self::start(store))
    }

    /// Spawn a StoreManager over an in-memory database
    pub fn spawn_in_memory() -> eyre::Result<Self> {
        debug!("spawn_in_memory: called");
        let store = SpendStore::open_in_memory()?;
        store.initialize_schema()?;
        Ok(Self::start(store))
    }

    fn start(store: SpendStore) -> Self {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(actor_loop(store, rx));
        info!("StoreManager spawned");
        Self { tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<StoreResponse<T>>) -> StoreCommand,
    ) -> StoreResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| StoreManagerError::ChannelError)?;
        reply_rx.await.map_err(|_| StoreManagerError::ChannelError)?
    }

    /// Describe every user table
    pub async fn describe_schema(&self) -> StoreResponse<Schema> {
        debug!("describe_schema: called");
        self.request(|reply| StoreCommand::Describe { reply }).await
    }

    /// Run one read-only statement; writes are refused
    pub async fn query_sql(&self, sql: &str) -> StoreResponse<Table> {
        debug!(sql_len = sql.len(), "query_sql: called");
        let sql = sql.to_string();
        self.request(|reply| StoreCommand::Query { sql, reply }).await
    }

    /// Execute a script in one transaction
    pub async fn execute_script(&self, sql: &str) -> StoreResponse<u64> {
        debug!(sql_len = sql.len(), "execute_script: called");
        let sql = sql.to_string();
        self.request(|reply| StoreCommand::ExecuteScript { sql, reply }).await
    }

    /// CREATE statements plus sample rows
    pub async fn table_info(&self, sample_rows: usize) -> StoreResponse<String> {
        debug!(sample_rows, "table_info: called");
        self.request(|reply| StoreCommand::TableInfo { sample_rows, reply })
            .await
    }

    pub async fn save_checkpoint(&self, thread_id: &str, version: u64, state: String) -> StoreResponse<()> {
        debug!(%thread_id, version, "save_checkpoint: called");
        let thread_id = thread_id.to_string();
        self.request(|reply| StoreCommand::SaveCheckpoint {
            thread_id,
            version,
            state,
            reply,
        })
        .await
    }

    pub async fn load_checkpoint(&self, thread_id: &str) -> StoreResponse<Option<Checkpoint>> {
        debug!(%thread_id, "load_checkpoint: called");
        let thread_id = thread_id.to_string();
        self.request(|reply| StoreCommand::LoadCheckpoint { thread_id, reply })
            .await
    }

    pub async fn price_cart(&self, items: Vec<CartItem>) -> StoreResponse<CartQuote> {
        debug!(items = items.len(), "price_cart: called");
        self.request(|reply| StoreCommand::PriceCart { items, reply }).await
    }

    /// Shutdown the StoreManager
    pub async fn shutdown(&self) -> Result<(), StoreManagerError> {
        debug!("shutdown: called");
        self.tx
            .send(StoreCommand::Shutdown)
            .await
            .map_err(|_| StoreManagerError::ChannelError)
    }
}

#[async_trait]
impl SqlExecutor for StoreManager {
    async fn execute(&self, sql: &str) -> SqlOutcome {
        match self.query_sql(sql).await {
            Ok(table) => SqlOutcome::Rows(table),
            Err(StoreManagerError::Store(message)) => {
                debug!(%message, "execute: statement failed");
                SqlOutcome::Failed(message)
            }
            Err(e) => {
                warn!(error = %e, "execute: store unavailable");
                SqlOutcome::Failed(e.to_string())
            }
        }
    }
}

#[async_trait]
impl SchemaSource for StoreManager {
    async fn describe(&self) -> Result<Schema, StoreManagerError> {
        self.describe_schema().await
    }
}

/// The actor loop that owns the SpendStore and processes commands
async fn actor_loop(mut store: SpendStore, mut rx: mpsc::Receiver<StoreCommand>) {
    debug!("StoreManager actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            StoreCommand::Describe { reply } => {
                debug!("actor_loop: Describe command");
                let _ = reply.send(store.describe().map_err(Into::into));
            }

            StoreCommand::Query { sql, reply } => {
                debug!("actor_loop: Query command");
                let _ = reply.send(store.query_readonly(&sql).map_err(Into::into));
            }

            StoreCommand::ExecuteScript { sql, reply } => {
                debug!("actor_loop: ExecuteScript command");
                let _ = reply.send(store.execute_script(&sql).map_err(Into::into));
            }

            StoreCommand::TableInfo { sample_rows, reply } => {
                debug!(sample_rows, "actor_loop: TableInfo command");
                let _ = reply.send(store.table_info(sample_rows).map_err(Into::into));
            }

            StoreCommand::SaveCheckpoint {
                thread_id,
                version,
                state,
                reply,
            } => {
                debug!(%thread_id, version, "actor_loop: SaveCheckpoint command");
                let _ = reply.send(
                    store
                        .save_checkpoint(&thread_id, version, &state)
                        .map_err(Into::into),
                );
            }

            StoreCommand::LoadCheckpoint { thread_id, reply } => {
                debug!(%thread_id, "actor_loop: LoadCheckpoint command");
                let _ = reply.send(store.load_checkpoint(&thread_id).map_err(Into::into));
            }

            StoreCommand::PriceCart { items, reply } => {
                debug!(items = items.len(), "actor_loop: PriceCart command");
                let _ = reply.send(store.price_cart(&items).map_err(Into::into));
            }

            StoreCommand::Shutdown => {
                info!("StoreManager shutting down");
                break;
            }
        }
    }

    debug!("StoreManager actor stopped");
}
