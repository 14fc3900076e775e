//! Report Workflow Loop
//!
//! ```text
//! Supervisor --SQLAgent----------> SqlAgent ------> Supervisor
//! Supervisor --ReportWriterAgent-> ReportWriter --> Supervisor
//! Supervisor --FINISH------------> done
//! ```
//!
//! Every node run counts as one step against `max_steps`.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cancel::cancellable;
use super::checkpoint::Checkpointer;
use super::error::WorkflowError;
use crate::agents::{ReportWriter, SqlAgent, Supervisor};
use crate::config::AgentsConfig;
use crate::llm::LlmClient;
use crate::prompts::PromptLoader;
use crate::state::{NO_REPORT, NextAgent, StateUpdate, WorkflowState};
use crate::store::{SchemaSource, SqlExecutor};

/// Why a report run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Termination {
    /// The supervisor answered FINISH
    Finished,
    /// No routing decision, but a report exists
    ReportPresent,
    PlanFailed,
    SqlFailed,
    ReportFailed,
    /// The external step ceiling was reached
    StepLimit,
}

impl Termination {
    pub fn is_success(&self) -> bool {
        matches!(self, Termination::Finished | Termination::ReportPresent)
    }
}

/// Outcome of one report run; the state is kept whatever the termination
#[derive(Debug, Clone)]
pub struct ReportRun {
    pub state: WorkflowState,
    pub steps: u32,
    pub termination: Termination,
}

impl ReportRun {
    fn new(state: WorkflowState, steps: u32, termination: Termination) -> Self {
        info!(steps, ?termination, "Report run finished");
        Self {
            state,
            steps,
            termination,
        }
    }
}

enum Worker {
    Sql,
    Writer,
}

enum Transition {
    Run(Worker),
    Done(Termination),
}

/// Where the loop goes after a Supervisor run
///
/// A successful plan always sets `next_agent`, so the two `None` arms only
/// apply to states that reach this point without a routing decision.
fn transition(state: &WorkflowState) -> Result<Transition, WorkflowError> {
    match state.next_agent {
        Some(NextAgent::Finish) => Ok(Transition::Done(Termination::Finished)),
        Some(NextAgent::SqlAgent) => Ok(Transition::Run(Worker::Sql)),
        Some(NextAgent::ReportWriterAgent) => Ok(Transition::Run(Worker::Writer)),
        None if state.report_text().is_some() => Ok(Transition::Done(Termination::ReportPresent)),
        None => Err(WorkflowError::NoRoute),
    }
}

/// Merge a node's update; a terminal error field ends the run
fn merge(state: &mut WorkflowState, update: StateUpdate) -> Result<Option<Termination>, WorkflowError> {
    if !update.is_failure() {
        state.apply(update);
        return Ok(None);
    }
    if update.user_query_error.is_some() {
        return Err(WorkflowError::EmptyUserQuery);
    }

    let termination = if update.plan_errors.is_some() {
        Termination::PlanFailed
    } else if update.sql_error.is_some() {
        Termination::SqlFailed
    } else {
        Termination::ReportFailed
    };
    state.apply(update);
    Ok(Some(termination))
}

pub struct ReportGraph {
    supervisor: Supervisor,
    sql_agent: SqlAgent,
    writer: ReportWriter,
    max_steps: u32,
}

impl ReportGraph {
    pub fn new(supervisor: Supervisor, sql_agent: SqlAgent, writer: ReportWriter, max_steps: u32) -> Self {
        Self {
            supervisor,
            sql_agent,
            writer,
            max_steps,
        }
    }

    /// Build the three agents from config; the schema is described once here
    pub async fn build(
        llm: Arc<dyn LlmClient>,
        executor: Arc<dyn SqlExecutor>,
        schema_source: &dyn SchemaSource,
        prompts: &PromptLoader,
        agents: &AgentsConfig,
        max_tokens: u32,
        today: &str,
    ) -> Result<Self, WorkflowError> {
        debug!(max_steps = agents.max_steps, "ReportGraph::build: called");
        let schema = schema_source.describe().await?;

        let supervisor =
            Supervisor::new(llm.clone(), prompts, agents.supervisor_max_iterations)?.with_max_tokens(max_tokens);
        let sql_agent = SqlAgent::new(llm.clone(), executor, schema, prompts, today, agents.sql_max_iterations)?
            .with_max_tokens(max_tokens);
        let writer = ReportWriter::new(llm, prompts, agents.report_max_iterations)?.with_max_tokens(max_tokens);

        Ok(Self::new(supervisor, sql_agent, writer, agents.max_steps))
    }

    /// Drive the supervisor/worker cycle until it terminates
    pub async fn invoke(&self, mut state: WorkflowState, cancel: &CancellationToken) -> Result<ReportRun, WorkflowError> {
        debug!(user_query = ?state.user_query, max_steps = self.max_steps, "ReportGraph::invoke: called");
        if state.full_report.is_none() {
            state.full_report = Some(NO_REPORT.to_string());
        }

        let mut steps = 0u32;
        loop {
            if steps >= self.max_steps {
                warn!(steps, "ReportGraph::invoke: step limit reached before supervisor");
                return Ok(ReportRun::new(state, steps, Termination::StepLimit));
            }
            steps += 1;
            let update = cancellable(cancel, self.supervisor.run(&state)).await?;
            if let Some(termination) = merge(&mut state, update)? {
                return Ok(ReportRun::new(state, steps, termination));
            }

            let worker = match transition(&state)? {
                Transition::Done(termination) => return Ok(ReportRun::new(state, steps, termination)),
                Transition::Run(worker) => worker,
            };

            if steps >= self.max_steps {
                warn!(steps, "ReportGraph::invoke: step limit reached before worker");
                return Ok(ReportRun::new(state, steps, Termination::StepLimit));
            }
            steps += 1;

            let update = match worker {
                Worker::Sql => cancellable(cancel, self.sql_agent.run(&state)).await?,
                Worker::Writer => cancellable(cancel, self.writer.run(&state)).await?,
            };
            if let Some(termination) = merge(&mut state, update)? {
                return Ok(ReportRun::new(state, steps, termination));
            }
        }
    }

    /// Run and keep the final snapshot under `thread_id`
    ///
    /// A cancelled or failed run saves nothing.
    pub async fn invoke_in_thread(
        &self,
        thread_id: &str,
        state: WorkflowState,
        checkpointer: &dyn Checkpointer,
        cancel: &CancellationToken,
    ) -> Result<ReportRun, WorkflowError> {
        debug!(%thread_id, "ReportGraph::invoke_in_thread: called");
        let run = self.invoke(state, cancel).await?;
        checkpointer.save(thread_id, &run.state).await?;
        Ok(run)
    }
}
