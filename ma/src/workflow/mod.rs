//! Workflow graphs
//!
//! `InvoiceGraph` routes one request into receipt ingestion or single-shot
//! Q&A. `ReportGraph` drives the supervisor and its two workers. Both take a
//! cancellation token and thread one `WorkflowState` through their steps.

mod cancel;
mod checkpoint;
mod error;
mod report;
mod router;

pub use cancel::cancellable;
pub use checkpoint::{Checkpointer, MemoryCheckpointer, StoreCheckpointer};
pub use error::WorkflowError;
pub use report::{ReportGraph, ReportRun, Termination};
pub use router::{Branch, InvoiceGraph, InvoiceSteps, LlmInvoiceSteps, route};
