//! marketagent - supermarket receipts in, spending answers out
//!
//! Receipts are converted to text, turned into `INSERT INTO invoices`
//! statements by a language model and stored in the spend database.
//! Questions are answered either in one shot or by a supervisor that plans
//! a report and hands work to a SQL worker and a report writer.
//!
//! # Modules
//!
//! - [`llm`] - LLM client trait and OpenAI implementation
//! - [`prompts`] - Handlebars prompt templates
//! - [`state`] - Workflow state and partial updates
//! - [`store`] - Actor over the spend database
//! - [`receipt`] - Receipt conversion and extraction
//! - [`agents`] - SQL worker, report writer and supervisor
//! - [`workflow`] - Router, report loop, checkpoints and cancellation
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod agents;
pub mod cli;
pub mod config;
pub mod llm;
pub mod prompts;
pub mod receipt;
pub mod state;
pub mod store;
pub mod workflow;

pub use config::{Config, LlmConfig};
pub use llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, OpenAIClient, create_client};
pub use state::{NextAgent, StateUpdate, WorkflowState};
pub use store::StoreManager;
pub use workflow::{InvoiceGraph, ReportGraph, ReportRun, Termination, WorkflowError};
