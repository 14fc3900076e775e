//! Agents: the SQL worker, the report writer and the supervisor
//!
//! Each agent reads the current `WorkflowState` and returns a `StateUpdate`.
//! Exhausting a retry budget is reported through an error field of the
//! update, never as an `Err`.

pub mod extract;
mod sql;
mod supervisor;
mod writer;

pub use extract::{JsonExtractError, extract_json_object, extract_query, extract_report, extract_sql};
pub use sql::{DIALECT, SqlAgent};
pub use supervisor::{Directive, MISSING_KEYS, Supervisor, USER_QUERY_MISSING};
pub use writer::ReportWriter;

use crate::state::SqlResults;

/// Render retrieved tables as narrative text, one block per question
pub fn fold_sql_results(results: &SqlResults) -> String {
    results
        .iter()
        .map(|(question, table)| format!("SQL Results:\nQuery: {}\nResult:\n{}\n\n", question, table))
        .collect()
}

/// Error history as shown in an exhaustion message
fn format_errors(errors: &[String]) -> String {
    if errors.is_empty() {
        return "none".to_string();
    }
    errors
        .iter()
        .enumerate()
        .map(|(i, e)| format!("\n{}. {}", i + 1, e))
        .collect()
}
