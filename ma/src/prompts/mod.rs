//! Prompt Template System
//!
//! Loads and renders `.pmt` (prompt template) files for the agents.
//!
//! Template loading chain:
//! 1. `.marketagent/prompts/{name}.pmt` (user override)
//! 2. `prompts/{name}.pmt` (repo default)
//! 3. Embedded fallback in code
//!
//! Templates use Handlebars syntax for variable substitution. Rendering never
//! HTML-escapes, since the output goes to a language model and not a browser.

pub mod embedded;
mod loader;

pub use loader::{AnswerContext, PromptLoader, QueryWriterContext, ReceiptContext, SqlAgentContext};

/// Template names
pub const SQL_AGENT: &str = "sql-agent";
pub const REPORT_WRITER: &str = "report-writer";
pub const SUPERVISOR: &str = "supervisor";
pub const RECEIPT_EXTRACTION: &str = "receipt-extraction";
pub const QUERY_WRITER: &str = "query-writer";
pub const ANSWER: &str = "answer";
