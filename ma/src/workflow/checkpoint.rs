//! Latest-snapshot checkpoints per session thread

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use super::error::WorkflowError;
use crate::state::WorkflowState;
use crate::store::StoreManager;

/// Keeps the latest state snapshot of each session thread
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn save(&self, thread_id: &str, state: &WorkflowState) -> Result<(), WorkflowError>;

    async fn load(&self, thread_id: &str) -> Result<Option<WorkflowState>, WorkflowError>;
}

/// Snapshots held for the life of the process
#[derive(Default)]
pub struct MemoryCheckpointer {
    snapshots: Mutex<HashMap<String, WorkflowState>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn save(&self, thread_id: &str, state: &WorkflowState) -> Result<(), WorkflowError> {
        debug!(%thread_id, version = state.version, "MemoryCheckpointer::save: called");
        let mut snapshots = self
            .snapshots
            .lock()
            .map_err(|_| WorkflowError::Store("checkpoint lock poisoned".to_string()))?;
        snapshots.insert(thread_id.to_string(), state.clone());
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<WorkflowState>, WorkflowError> {
        debug!(%thread_id, "MemoryCheckpointer::load: called");
        let snapshots = self
            .snapshots
            .lock()
            .map_err(|_| WorkflowError::Store("checkpoint lock poisoned".to_string()))?;
        Ok(snapshots.get(thread_id).cloned())
    }
}

/// Snapshots stored as JSON in the spend database
#[derive(Clone)]
pub struct StoreCheckpointer {
    store: StoreManager,
}

impl StoreCheckpointer {
    pub fn new(store: StoreManager) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Checkpointer for StoreCheckpointer {
    async fn save(&self, thread_id: &str, state: &WorkflowState) -> Result<(), WorkflowError> {
        debug!(%thread_id, version = state.version, "StoreCheckpointer::save: called");
        let json = serde_json::to_string(state).map_err(|e| WorkflowError::Store(e.to_string()))?;
        self.store.save_checkpoint(thread_id, state.version, json).await?;
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<WorkflowState>, WorkflowError> {
        debug!(%thread_id, "StoreCheckpointer::load: called");
        match self.store.load_checkpoint(thread_id).await? {
            Some(checkpoint) => {
                let state = serde_json::from_str(&checkpoint.state).map_err(|e| WorkflowError::Store(e.to_string()))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }
}
