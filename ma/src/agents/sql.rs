//! SQL Retrieval Worker
//!
//! Turns one natural-language question into an executed table. A statement
//! that fails to execute is fed back to the model together with the database
//! error; a generation failure ends the loop early since there is nothing to
//! execute.

use std::sync::Arc;

use spendstore::Schema;
use tracing::{debug, info, warn};

use super::format_errors;
use crate::llm::{CompletionRequest, DEFAULT_MAX_TOKENS, LlmClient};
use crate::prompts::{PromptLoader, SQL_AGENT, SqlAgentContext};
use crate::state::{ResultsUpdate, SqlResults, StateUpdate, WorkflowState};
use crate::store::{SqlExecutor, SqlOutcome};

/// SQL dialect announced to the model
pub const DIALECT: &str = "SQLite";

/// Statement that failed and the error it produced
#[derive(Debug, Clone)]
struct FailedAttempt {
    sql: String,
    error: String,
}

pub struct SqlAgent {
    llm: Arc<dyn LlmClient>,
    executor: Arc<dyn SqlExecutor>,
    schema: Schema,
    system_prompt: String,
    max_iterations: u32,
    max_tokens: u32,
}

impl SqlAgent {
    /// Build the worker around a schema described once up front
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: Arc<dyn SqlExecutor>,
        schema: Schema,
        prompts: &PromptLoader,
        today: &str,
        max_iterations: u32,
    ) -> eyre::Result<Self> {
        debug!(%today, max_iterations, "SqlAgent::new: called");
        let system_prompt = prompts.render(
            SQL_AGENT,
            &SqlAgentContext {
                dialect: DIALECT.to_string(),
                today: today.to_string(),
            },
        )?;

        Ok(Self {
            llm,
            executor,
            schema,
            system_prompt,
            max_iterations,
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn user_prompt(&self, question: &str, last_failure: Option<&FailedAttempt>) -> String {
        let mut prompt = format!("Here is the database schema:\n{}\n", self.schema);
        if let Some(failure) = last_failure {
            prompt.push_str(&format!(
                "Earlier, the following SQL query was generated:\n{}\nIt caused the following error:\n{}\nPlease correct the query.\n\n",
                failure.sql, failure.error
            ));
        }
        prompt.push_str(&format!(
            "Convert the following natural language query to SQL:\n'{}'",
            question
        ));
        prompt
    }

    /// Answer `query_for_agent` with a table keyed by the question text
    pub async fn run(&self, state: &WorkflowState) -> StateUpdate {
        let question = state.query_for_agent.as_deref().map(str::trim).unwrap_or_default();
        debug!(%question, "SqlAgent::run: called");

        if question.is_empty() {
            return StateUpdate {
                sql_error: Some("No question was given to the SQL agent".to_string()),
                ..Default::default()
            };
        }

        let mut current_question = question.to_string();
        let mut last_failure: Option<FailedAttempt> = None;
        let mut errors: Vec<String> = Vec::new();
        let mut attempts = 0;

        for iteration in 1..=self.max_iterations {
            attempts = iteration;
            let request = CompletionRequest::new(
                self.system_prompt.clone(),
                self.user_prompt(&current_question, last_failure.as_ref()),
            )
            .with_max_tokens(self.max_tokens);

            let sql = match self.llm.complete(request).await {
                Ok(response) => match response.non_empty_text().and_then(super::extract_sql) {
                    Some(sql) => sql,
                    None => {
                        warn!(iteration, "SqlAgent::run: no SQL in response");
                        errors.push("The model returned no SQL statement".to_string());
                        break;
                    }
                },
                Err(e) => {
                    warn!(iteration, error = %e, "SqlAgent::run: generation failed");
                    errors.push(format!("SQL generation failed: {}", e));
                    break;
                }
            };

            debug!(iteration, %sql, "SqlAgent::run: executing");
            match self.executor.execute(&sql).await {
                SqlOutcome::Rows(table) => {
                    info!(iteration, rows = table.row_count(), "SQL query succeeded");
                    let mut results = SqlResults::new();
                    results.insert(question.to_string(), table);
                    return StateUpdate {
                        sql_results: Some(ResultsUpdate::Merge(results)),
                        ..Default::default()
                    };
                }
                SqlOutcome::Failed(error) => {
                    warn!(iteration, %error, "SqlAgent::run: execution failed");
                    errors.push(format!("Query: {}\nError: {}", sql, error));
                    current_question = format!(
                        "{}\nNote: The following error occurred while executing the SQL: {}",
                        question, error
                    );
                    last_failure = Some(FailedAttempt { sql, error });
                }
            }
        }

        StateUpdate {
            sql_error: Some(format!(
                "Failed to generate a correct SQL query after {} iterations.\nErrors: {}",
                attempts,
                format_errors(&errors)
            )),
            ..Default::default()
        }
    }
}
