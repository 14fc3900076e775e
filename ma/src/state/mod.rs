//! Workflow state threaded through one top-level invocation
//!
//! Each step receives the full prior state by reference and returns a
//! `StateUpdate`; the driving graph merges the update and bumps the version.

mod update;
mod workflow;

pub use update::{ResultsUpdate, StateUpdate};
pub use workflow::{NO_INFO, NO_REPORT, NextAgent, SqlResults, WorkflowState};
