//! Integration tests for marketagent
//!
//! Gateway and executor are scripted doubles unless a test says otherwise.

mod common;

use std::sync::Arc;

use common::{RecordingSteps, ScriptedExecutor, ScriptedLlm, StaticSchema, invoices_schema, one_row};
use marketagent::agents::{ReportWriter, SqlAgent, Supervisor};
use marketagent::config::AgentsConfig;
use marketagent::prompts::PromptLoader;
use marketagent::state::{NextAgent, WorkflowState};
use marketagent::store::{SqlOutcome, StoreManager};
use marketagent::workflow::{
    Checkpointer, InvoiceGraph, ReportGraph, StoreCheckpointer, Termination, WorkflowError,
};
use proptest::prelude::*;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const TO_SQL: &str = r#"{"plan": "Retrieve totals", "next_agent": "SQLAgent", "query_for_agent": "Total spend per supermarket"}"#;
const TO_WRITER: &str = r#"{"plan": "Write it up", "next_agent": "ReportWriterAgent", "query_for_agent": "Write the report"}"#;
const FINISH: &str = r#"{"plan": "Done", "next_agent": "FINISH", "query_for_agent": ""}"#;

fn prompts() -> PromptLoader {
    PromptLoader::embedded_only()
}

fn report_state(query_for_agent: &str) -> WorkflowState {
    let mut state = WorkflowState::for_report("Monthly spending report");
    state.next_agent = Some(NextAgent::SqlAgent);
    state.query_for_agent = Some(query_for_agent.to_string());
    state
}

async fn scripted_graph(llm: Arc<ScriptedLlm>, executor: Arc<ScriptedExecutor>, max_steps: u32) -> ReportGraph {
    let agents = AgentsConfig {
        max_steps,
        ..Default::default()
    };
    ReportGraph::build(
        llm,
        executor,
        &StaticSchema(invoices_schema()),
        &prompts(),
        &agents,
        1024,
        "2025-03-31",
    )
    .await
    .unwrap()
}

// =============================================================================
// Router scenarios
// =============================================================================

#[tokio::test]
async fn test_scenario_a_receipt_path_runs_ingestion_only() {
    let steps = Arc::new(RecordingSteps::default());
    let graph = InvoiceGraph::new(steps.clone());

    let state = graph
        .invoke(WorkflowState::for_receipt("receipt.pdf"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(steps.calls(), vec!["process_pdf_receipt", "extract_data", "insert_data"]);
    assert_eq!(state.process_data, Some(true));
    assert_eq!(state.receipt.as_deref(), Some("text of receipt.pdf"));
    assert!(state.query.is_none());
}

#[tokio::test]
async fn test_scenario_b_question_runs_qa_only() {
    let steps = Arc::new(RecordingSteps::default());
    let graph = InvoiceGraph::new(steps.clone());

    let state = graph
        .invoke(
            WorkflowState::for_question("How much did I spend on dairy in March?"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(steps.calls(), vec!["write_query", "execute_query", "generate_answer"]);
    assert_eq!(state.process_data, Some(false));
    assert_eq!(state.result.as_deref(), Some("42.5"));
    assert_eq!(state.answer.as_deref(), Some("You spent 42.5 on dairy."));
    assert!(state.receipt.is_none());
}

#[tokio::test]
async fn test_router_rejects_empty_state() {
    let steps = Arc::new(RecordingSteps::default());
    let graph = InvoiceGraph::new(steps.clone());

    let err = graph
        .invoke(WorkflowState::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::InvalidInput));
    assert!(steps.calls().is_empty());
}

#[tokio::test]
async fn test_router_cancelled_before_first_step() {
    let steps = Arc::new(RecordingSteps::default());
    let graph = InvoiceGraph::new(steps.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = graph
        .invoke(WorkflowState::for_question("q"), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Cancelled));
    assert!(steps.calls().is_empty());
}

proptest! {
    #[test]
    fn prop_p1_routing_exclusivity(path in "[a-z./ ]{0,10}", question in "[a-z? ]{0,10}") {
        let state = WorkflowState {
            path: Some(path.clone()),
            question: Some(question.clone()),
            ..Default::default()
        };
        let result = marketagent::workflow::route(&state);
        if !path.trim().is_empty() {
            prop_assert_eq!(result.ok(), Some(marketagent::workflow::Branch::Ingest));
        } else if !question.trim().is_empty() {
            prop_assert_eq!(result.ok(), Some(marketagent::workflow::Branch::Question));
        } else {
            prop_assert!(matches!(result, Err(WorkflowError::InvalidInput)));
        }
    }
}

// =============================================================================
// SQL Retrieval Worker
// =============================================================================

#[tokio::test]
async fn test_scenario_c_sql_self_correction() {
    let llm = Arc::new(ScriptedLlm::texts(&[
        "SELECT SUM(total) FROM invoices",
        "```sql\nSELECT SUM(total_value) AS spent FROM invoices\n```",
    ]));
    let executor = Arc::new(ScriptedExecutor::new(vec![
        SqlOutcome::Failed("no such column: total".to_string()),
        SqlOutcome::Rows(one_row("spent", 128.4)),
    ]));
    let agent = SqlAgent::new(llm.clone(), executor.clone(), invoices_schema(), &prompts(), "2025-03-31", 2).unwrap();

    let mut state = report_state("Total spend");
    let update = agent.run(&state).await;
    state.apply(update);

    assert_eq!(llm.call_count(), 2);
    assert_eq!(executor.statements().len(), 2);
    assert!(llm
        .user_text(1)
        .contains("Total spend\nNote: The following error occurred while executing the SQL: no such column: total"));
    assert_eq!(state.sql_results.len(), 1);
    assert_eq!(state.sql_results["Total spend"], one_row("spent", 128.4));
    assert!(state.sql_error.is_none());
}

#[tokio::test]
async fn test_p2_success_short_circuits_remaining_budget() {
    let llm = Arc::new(ScriptedLlm::texts(&["SELECT a", "SELECT b", "SELECT c", "SELECT d"]));
    let executor = Arc::new(ScriptedExecutor::new(vec![
        SqlOutcome::Failed("bad".to_string()),
        SqlOutcome::Rows(one_row("n", 1.0)),
    ]));
    let agent = SqlAgent::new(llm.clone(), executor.clone(), invoices_schema(), &prompts(), "2025-03-31", 4).unwrap();

    let update = agent.run(&report_state("q")).await;

    assert!(update.sql_results.is_some());
    assert_eq!(llm.call_count(), 2);
    assert_eq!(executor.statements(), vec!["SELECT a", "SELECT b"]);
}

#[tokio::test]
async fn test_p3_sql_exhaustion_is_a_single_error_field() {
    let llm = Arc::new(ScriptedLlm::texts(&["SELECT a", "SELECT b"]));
    let executor = Arc::new(ScriptedExecutor::new(vec![
        SqlOutcome::Failed("e1".to_string()),
        SqlOutcome::Failed("e2".to_string()),
    ]));
    let agent = SqlAgent::new(llm, executor, invoices_schema(), &prompts(), "2025-03-31", 2).unwrap();

    let update = agent.run(&report_state("q")).await;

    assert!(update.sql_error.is_some());
    assert!(update.sql_results.is_none());
    assert!(update.report_error.is_none() && update.plan_errors.is_none());
}

#[tokio::test]
async fn test_sql_worker_never_writes_to_the_store() {
    let store = StoreManager::spawn_in_memory().unwrap();
    store
        .execute_script(
            "INSERT INTO invoices VALUES \
             ('1', 'SuperNova', '2025-03-01', 'LTE', 2, 'Un', 5.00, 10.00, 'Leite', 'Leite Italac', '1L', 'Laticínios')",
        )
        .await
        .unwrap();

    let llm = Arc::new(ScriptedLlm::texts(&["DELETE FROM invoices", "UPDATE invoices SET total_value = 0"]));
    let agent = SqlAgent::new(
        llm.clone(),
        Arc::new(store.clone()),
        invoices_schema(),
        &prompts(),
        "2025-03-31",
        2,
    )
    .unwrap();

    let update = agent.run(&report_state("Total spend")).await;

    assert!(update.sql_results.is_none());
    assert!(update.sql_error.unwrap().contains("read-only"));
    assert!(llm.user_text(1).contains("Note: The following error occurred"));

    let table = store.query_sql("SELECT total_value FROM invoices").await.unwrap();
    assert_eq!(table.row_count(), 1);
    assert_eq!(table.rows[0][0].as_f64(), Some(10.0));
}

// =============================================================================
// Report-Writing Worker
// =============================================================================

#[tokio::test]
async fn test_p3_writer_exhaustion_is_a_single_error_field() {
    let llm = Arc::new(ScriptedLlm::new(vec![Err("overloaded".to_string()), Ok("no heading".to_string())]));
    let writer = ReportWriter::new(llm.clone(), &prompts(), 2).unwrap();

    let update = writer.run(&WorkflowState::for_report("q")).await;

    assert!(update.full_report.is_none());
    let error = update.report_error.unwrap();
    assert!(error.contains("overloaded"));
    assert!(error.contains("No markdown heading"));
    assert_eq!(llm.call_count(), 2);
}

// =============================================================================
// Supervisor Planner
// =============================================================================

#[tokio::test]
async fn test_scenario_d_supervisor_recovers_from_missing_json() {
    let llm = Arc::new(ScriptedLlm::texts(&["Let me think about the report first.", TO_SQL]));
    let supervisor = Supervisor::new(llm.clone(), &prompts(), 2).unwrap();

    let update = supervisor.run(&WorkflowState::for_report("Monthly spending")).await;

    assert!(update.plan_errors.is_none());
    assert_eq!(update.plan.as_deref(), Some("Retrieve totals"));
    assert_eq!(update.next_agent, Some(NextAgent::SqlAgent));
    assert_eq!(update.query_for_agent.as_deref(), Some("Total spend per supermarket"));
    assert_eq!(llm.call_count(), 2);
}

#[tokio::test]
async fn test_scenario_e_empty_user_query() {
    let llm = Arc::new(ScriptedLlm::texts(&[TO_SQL]));
    let supervisor = Supervisor::new(llm.clone(), &prompts(), 2).unwrap();

    let update = supervisor.run(&WorkflowState::for_report("")).await;

    assert!(update.user_query_error.is_some());
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn test_p4_incomplete_plans_never_succeed() {
    let llm = Arc::new(ScriptedLlm::texts(&[
        r#"{"plan": "p", "query_for_agent": "q"}"#,
        r#"{"next_agent": "SQLAgent", "query_for_agent": "q"}"#,
    ]));
    let supervisor = Supervisor::new(llm.clone(), &prompts(), 2).unwrap();

    let update = supervisor.run(&WorkflowState::for_report("report")).await;

    assert!(update.plan_errors.is_some());
    assert!(update.plan.is_none());
    assert!(update.next_agent.is_none());
    assert!(update.query_for_agent.is_none());
}

// =============================================================================
// Report Workflow Loop
// =============================================================================

#[tokio::test]
async fn test_report_loop_full_cycle() {
    let llm = Arc::new(ScriptedLlm::texts(&[
        TO_SQL,
        "SELECT supermarket_name, SUM(total_value) AS spent FROM invoices GROUP BY 1",
        TO_WRITER,
        "REPORT_START:\n# Spending by Supermarket\nAtacadão leads.",
        FINISH,
    ]));
    let executor = Arc::new(ScriptedExecutor::new(vec![SqlOutcome::Rows(one_row("spent", 310.0))]));
    let graph = scripted_graph(llm.clone(), executor, 100).await;

    let run = graph
        .invoke(WorkflowState::for_report("Spending by supermarket"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.termination, Termination::Finished);
    assert_eq!(run.steps, 5);
    assert_eq!(run.state.report_text(), Some("# Spending by Supermarket\nAtacadão leads."));
    assert!(run.state.info.contains("Query: Total spend per supermarket"));
    assert!(run.state.sql_results.is_empty());
}

#[tokio::test]
async fn test_p5_oscillation_reaches_done_within_ceiling() {
    let mut script = Vec::new();
    for _ in 0..4 {
        script.push(TO_WRITER);
        script.push("# Draft");
    }
    script.push(FINISH);
    let llm = Arc::new(ScriptedLlm::texts(&script));
    let graph = scripted_graph(llm, Arc::new(ScriptedExecutor::new(vec![])), 20).await;

    let run = graph
        .invoke(WorkflowState::for_report("q"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.termination, Termination::Finished);
    assert_eq!(run.steps, 9);
    assert!(run.steps <= 20);
}

#[tokio::test]
async fn test_step_ceiling_stops_endless_oscillation() {
    let script: Vec<&str> = std::iter::repeat_n([TO_WRITER, "# Draft"], 10).flatten().collect();
    let llm = Arc::new(ScriptedLlm::texts(&script));
    let graph = scripted_graph(llm.clone(), Arc::new(ScriptedExecutor::new(vec![])), 6).await;

    let run = graph
        .invoke(WorkflowState::for_report("q"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.termination, Termination::StepLimit);
    assert_eq!(run.steps, 6);
    assert_eq!(llm.call_count(), 6);
    assert_eq!(run.state.report_text(), Some("# Draft"));
}

// =============================================================================
// Store-backed end to end
// =============================================================================

#[tokio::test]
async fn test_report_against_sqlite_with_checkpoint() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp.path().join("spend.db");

    let store = StoreManager::spawn(&db_path).unwrap();
    store
        .execute_script(
            "INSERT INTO invoices VALUES \
             ('1', 'SuperNova', '2025-03-01', 'LTE', 2, 'Un', 5.00, 10.00, 'Leite', 'Leite Italac', '1L', 'Laticínios'), \
             ('2', 'Atacadão', '2025-03-09', 'CAFE', 1, 'Un', 38.99, 38.99, 'Cafe', 'Cafe Orfeu', '250G', 'Bebidas')",
        )
        .await
        .unwrap();

    let llm = Arc::new(ScriptedLlm::texts(&[
        TO_SQL,
        "SELECT supermarket_name, SUM(total_value) AS spent FROM invoices GROUP BY supermarket_name ORDER BY spent DESC",
        TO_WRITER,
        "# Spending Report\nAtacadão: 38.99",
        FINISH,
    ]));
    let graph = ReportGraph::build(
        llm.clone(),
        Arc::new(store.clone()),
        &store,
        &prompts(),
        &AgentsConfig::default(),
        1024,
        "2025-03-31",
    )
    .await
    .unwrap();

    let checkpointer = StoreCheckpointer::new(store.clone());
    let run = graph
        .invoke_in_thread("thread-1", WorkflowState::for_report("Spend per store"), &checkpointer, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.termination, Termination::Finished);
    assert!(run.state.info.contains("Atacadão"));
    assert!(llm.user_text(3).contains("38.99"));

    store.shutdown().await.unwrap();

    let reopened = StoreManager::spawn(&db_path).unwrap();
    let saved = StoreCheckpointer::new(reopened)
        .load("thread-1")
        .await
        .unwrap()
        .expect("checkpoint saved");
    assert_eq!(saved, run.state);
}
