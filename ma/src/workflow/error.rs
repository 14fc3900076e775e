//! Workflow errors
//!
//! Only input problems, cancellation and collaborator failures are errors.
//! Exhausted retry budgets are state fields.

use thiserror::Error;

use crate::llm::LlmError;
use crate::receipt::ReceiptError;
use crate::store::StoreManagerError;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Invalid input: either a receipt path or a question is required")]
    InvalidInput,

    #[error("User query is empty")]
    EmptyUserQuery,

    #[error("Invocation cancelled")]
    Cancelled,

    #[error("Gateway error: {0}")]
    Gateway(#[from] LlmError),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Receipt error: {0}")]
    Receipt(#[from] ReceiptError),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Supervisor gave no next agent and no report exists")]
    NoRoute,
}

impl From<StoreManagerError> for WorkflowError {
    fn from(e: StoreManagerError) -> Self {
        WorkflowError::Store(e.to_string())
    }
}

impl From<eyre::Report> for WorkflowError {
    fn from(e: eyre::Report) -> Self {
        WorkflowError::Prompt(e.to_string())
    }
}
