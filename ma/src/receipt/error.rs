//! Receipt extraction errors

use std::time::Duration;

use thiserror::Error;

use crate::llm::LlmError;

/// Errors while turning a receipt document into an insert statement
#[derive(Debug, Error)]
pub enum ReceiptError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Conversion with {command} failed: {message}")]
    ConversionFailed { command: String, message: String },

    #[error("Conversion timed out after {0:?}")]
    Timeout(Duration),

    #[error("Document contains no text")]
    EmptyDocument,

    #[error("Gateway error: {0}")]
    Gateway(#[from] LlmError),

    #[error("Model output is not an invoices insert: {0}")]
    NotAnInsert(String),

    #[error("Prompt error: {0}")]
    Prompt(String),
}
