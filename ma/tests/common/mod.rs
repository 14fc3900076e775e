//! Shared doubles for the marketagent integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use marketagent::llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError};
use marketagent::store::{SchemaSource, SqlExecutor, SqlOutcome, StoreManagerError};
use marketagent::workflow::{InvoiceSteps, WorkflowError};
use spendstore::{ColumnInfo, Schema, Table, Value};

/// Gateway replaying scripted replies; `Err` entries become API errors
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn texts(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn user_text(&self, index: usize) -> String {
        self.requests.lock().unwrap()[index].user_prompt.clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(CompletionResponse::text(text)),
            Some(Err(message)) => Err(LlmError::ApiError { status: 500, message }),
            None => Err(LlmError::InvalidResponse("script exhausted".to_string())),
        }
    }
}

/// Executor replaying scripted outcomes
pub struct ScriptedExecutor {
    outcomes: Mutex<VecDeque<SqlOutcome>>,
    statements: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new(outcomes: Vec<SqlOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            statements: Mutex::new(Vec::new()),
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlExecutor for ScriptedExecutor {
    async fn execute(&self, sql: &str) -> SqlOutcome {
        self.statements.lock().unwrap().push(sql.to_string());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| SqlOutcome::Failed("no scripted outcome".to_string()))
    }
}

/// Fixed schema
pub struct StaticSchema(pub Schema);

#[async_trait]
impl SchemaSource for StaticSchema {
    async fn describe(&self) -> Result<Schema, StoreManagerError> {
        Ok(self.0.clone())
    }
}

pub fn invoices_schema() -> Schema {
    let mut schema = Schema::new();
    schema.insert(
        "invoices",
        vec![
            ColumnInfo::new("supermarket_name", "TEXT"),
            ColumnInfo::new("datetime", "DATE"),
            ColumnInfo::new("total_value", "DECIMAL(10,2)"),
            ColumnInfo::new("category", "TEXT"),
        ],
    );
    schema
}

pub fn one_row(column: &str, value: f64) -> Table {
    Table::new(vec![column.to_string()], vec![vec![Value::Real(value)]])
}

/// Pipeline steps that only record the order they were called in
#[derive(Default)]
pub struct RecordingSteps {
    calls: Mutex<Vec<&'static str>>,
}

impl RecordingSteps {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, step: &'static str) {
        self.calls.lock().unwrap().push(step);
    }
}

#[async_trait]
impl InvoiceSteps for RecordingSteps {
    async fn process_pdf_receipt(&self, path: &str) -> Result<String, WorkflowError> {
        self.record("process_pdf_receipt");
        Ok(format!("text of {}", path))
    }

    async fn extract_data(&self, receipt: &str) -> Result<String, WorkflowError> {
        self.record("extract_data");
        Ok(format!("INSERT INTO invoices VALUES ('{}')", receipt))
    }

    async fn insert_data(&self, _statement: &str) -> Result<u64, WorkflowError> {
        self.record("insert_data");
        Ok(3)
    }

    async fn write_query(&self, _question: &str) -> Result<String, WorkflowError> {
        self.record("write_query");
        Ok("SELECT SUM(total_value) FROM invoices WHERE category = 'Laticínios'".to_string())
    }

    async fn execute_query(&self, _query: &str) -> String {
        self.record("execute_query");
        "42.5".to_string()
    }

    async fn generate_answer(&self, _question: &str, _query: &str, result: &str) -> Result<String, WorkflowError> {
        self.record("generate_answer");
        Ok(format!("You spent {} on dairy.", result))
    }
}
