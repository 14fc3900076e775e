//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// SQL retrieval worker system prompt
pub const SQL_AGENT: &str = include_str!("../../prompts/sql-agent.pmt");

/// Report-writing worker system prompt
pub const REPORT_WRITER: &str = include_str!("../../prompts/report-writer.pmt");

/// Supervisor planner system prompt
pub const SUPERVISOR: &str = include_str!("../../prompts/supervisor.pmt");

/// Receipt text to INSERT statement
pub const RECEIPT_EXTRACTION: &str = include_str!("../../prompts/receipt-extraction.pmt");

/// Single-shot question to SQL
pub const QUERY_WRITER: &str = include_str!("../../prompts/query-writer.pmt");

/// Single-shot answer from a query result
pub const ANSWER: &str = include_str!("../../prompts/answer.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    let found = match name {
        super::SQL_AGENT => Some(SQL_AGENT),
        super::REPORT_WRITER => Some(REPORT_WRITER),
        super::SUPERVISOR => Some(SUPERVISOR),
        super::RECEIPT_EXTRACTION => Some(RECEIPT_EXTRACTION),
        super::QUERY_WRITER => Some(QUERY_WRITER),
        super::ANSWER => Some(ANSWER),
        _ => None,
    };
    if found.is_none() {
        debug!(%name, "get_embedded: no match found");
    }
    found
}
