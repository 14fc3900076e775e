//! Receipt Extraction Service
//!
//! Converts a receipt document to text, then asks the gateway for a single
//! `INSERT INTO invoices` statement covering every line item.

mod convert;
mod error;
mod extract;

pub use convert::{CommandConverter, DocumentConverter, INPUT_PLACEHOLDER};
pub use error::ReceiptError;
pub use extract::ReceiptExtractor;
