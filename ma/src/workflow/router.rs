//! Ingestion/Query Router
//!
//! One presence check picks a linear chain: a receipt path runs
//! `process_pdf_receipt -> extract_data -> insert_data`, a question runs
//! `write_query -> execute_query -> generate_answer`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::cancel::cancellable;
use super::error::WorkflowError;
use crate::agents::{DIALECT, extract_query};
use crate::llm::{CompletionRequest, DEFAULT_MAX_TOKENS, LlmClient, LlmError};
use crate::prompts::{ANSWER, AnswerContext, PromptLoader, QUERY_WRITER, QueryWriterContext};
use crate::receipt::{DocumentConverter, ReceiptExtractor};
use crate::state::{StateUpdate, WorkflowState};
use crate::store::{SqlExecutor, SqlOutcome, StoreManager};

/// Sample rows shown to the single-shot query writer
const TABLE_INFO_SAMPLE_ROWS: usize = 3;

/// Entry branch chosen by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Ingest,
    Question,
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Pick the branch; a path wins over a question
pub fn route(state: &WorkflowState) -> Result<Branch, WorkflowError> {
    if present(&state.path) {
        Ok(Branch::Ingest)
    } else if present(&state.question) {
        Ok(Branch::Question)
    } else {
        Err(WorkflowError::InvalidInput)
    }
}

/// The six pipeline steps
#[async_trait]
pub trait InvoiceSteps: Send + Sync {
    /// Receipt document to text
    async fn process_pdf_receipt(&self, path: &str) -> Result<String, WorkflowError>;

    /// Receipt text to an insert statement
    async fn extract_data(&self, receipt: &str) -> Result<String, WorkflowError>;

    /// Run the insert; returns affected rows
    async fn insert_data(&self, statement: &str) -> Result<u64, WorkflowError>;

    async fn write_query(&self, question: &str) -> Result<String, WorkflowError>;

    /// Never fails: a database error comes back as `Error: <message>`
    async fn execute_query(&self, query: &str) -> String;

    async fn generate_answer(&self, question: &str, query: &str, result: &str) -> Result<String, WorkflowError>;
}

/// Steps backed by the gateway, the receipt service and the store
pub struct LlmInvoiceSteps {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    converter: Arc<dyn DocumentConverter>,
    extractor: ReceiptExtractor,
    store: StoreManager,
    top_k: u32,
    max_tokens: u32,
}

impl LlmInvoiceSteps {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptLoader>,
        converter: Arc<dyn DocumentConverter>,
        store: StoreManager,
        top_k: u32,
    ) -> Self {
        debug!(top_k, "LlmInvoiceSteps::new: called");
        Self {
            extractor: ReceiptExtractor::new(llm.clone(), prompts.clone()),
            llm,
            prompts,
            converter,
            store,
            top_k,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.extractor = self.extractor.with_max_tokens(max_tokens);
        self.max_tokens = max_tokens;
        self
    }

    async fn complete_text(&self, system: String, user: String) -> Result<String, WorkflowError> {
        let request = CompletionRequest::new(system, user).with_max_tokens(self.max_tokens);
        let response = self.llm.complete(request).await?;
        response
            .non_empty_text()
            .map(str::to_string)
            .ok_or_else(|| LlmError::InvalidResponse("empty response".to_string()).into())
    }
}

#[async_trait]
impl InvoiceSteps for LlmInvoiceSteps {
    async fn process_pdf_receipt(&self, path: &str) -> Result<String, WorkflowError> {
        debug!(%path, "process_pdf_receipt: called");
        Ok(self.converter.to_text(Path::new(path)).await?)
    }

    async fn extract_data(&self, receipt: &str) -> Result<String, WorkflowError> {
        debug!(receipt_len = receipt.len(), "extract_data: called");
        Ok(self.extractor.to_insert_statement(receipt).await?)
    }

    async fn insert_data(&self, statement: &str) -> Result<u64, WorkflowError> {
        debug!(statement_len = statement.len(), "insert_data: called");
        Ok(self.store.execute_script(statement).await?)
    }

    async fn write_query(&self, question: &str) -> Result<String, WorkflowError> {
        debug!(%question, "write_query: called");
        let table_info = self.store.table_info(TABLE_INFO_SAMPLE_ROWS).await?;
        let system = self.prompts.render(
            QUERY_WRITER,
            &QueryWriterContext {
                dialect: DIALECT.to_string(),
                top_k: self.top_k,
                table_info,
            },
        )?;

        let text = self.complete_text(system, format!("Question: {}", question)).await?;
        extract_query(&text).ok_or_else(|| LlmError::InvalidResponse("no SQL query in response".to_string()).into())
    }

    async fn execute_query(&self, query: &str) -> String {
        debug!(%query, "execute_query: called");
        match SqlExecutor::execute(&self.store, query).await {
            SqlOutcome::Rows(table) => table.to_string(),
            SqlOutcome::Failed(message) => format!("Error: {}", message),
        }
    }

    async fn generate_answer(&self, question: &str, query: &str, result: &str) -> Result<String, WorkflowError> {
        debug!(%question, "generate_answer: called");
        let prompt = self.prompts.render(
            ANSWER,
            &AnswerContext {
                question: question.to_string(),
                query: query.to_string(),
                result: result.to_string(),
            },
        )?;
        self.complete_text(String::new(), prompt).await
    }
}

/// Router plus the two linear pipelines
pub struct InvoiceGraph {
    steps: Arc<dyn InvoiceSteps>,
}

impl InvoiceGraph {
    pub fn new(steps: Arc<dyn InvoiceSteps>) -> Self {
        Self { steps }
    }

    /// Route once and run the chosen pipeline to the end
    pub async fn invoke(&self, mut state: WorkflowState, cancel: &CancellationToken) -> Result<WorkflowState, WorkflowError> {
        let branch = route(&state)?;
        debug!(?branch, "InvoiceGraph::invoke: routed");
        state.apply(StateUpdate {
            process_data: Some(branch == Branch::Ingest),
            ..Default::default()
        });

        match branch {
            Branch::Ingest => {
                let path = state.path.clone().unwrap_or_default();

                let receipt = cancellable(cancel, self.steps.process_pdf_receipt(&path)).await??;
                state.apply(StateUpdate {
                    receipt: Some(receipt.clone()),
                    ..Default::default()
                });

                let statement = cancellable(cancel, self.steps.extract_data(&receipt)).await??;
                state.apply(StateUpdate {
                    result: Some(statement.clone()),
                    ..Default::default()
                });

                let rows = cancellable(cancel, self.steps.insert_data(&statement)).await??;
                info!(%path, rows, "Receipt ingested");
                state.apply(StateUpdate {
                    answer: Some(format!("Inserted {} line items from {}", rows, path)),
                    ..Default::default()
                });
            }
            Branch::Question => {
                let question = state.question.clone().unwrap_or_default();

                let query = cancellable(cancel, self.steps.write_query(&question)).await??;
                state.apply(StateUpdate {
                    query: Some(query.clone()),
                    ..Default::default()
                });

                let result = cancellable(cancel, self.steps.execute_query(&query)).await?;
                state.apply(StateUpdate {
                    result: Some(result.clone()),
                    ..Default::default()
                });

                let answer = cancellable(cancel, self.steps.generate_answer(&question, &query, &result)).await??;
                info!(%question, "Question answered");
                state.apply(StateUpdate {
                    answer: Some(answer),
                    ..Default::default()
                });
            }
        }

        Ok(state)
    }
}
