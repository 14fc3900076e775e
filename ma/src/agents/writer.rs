//! Report-Writing Worker

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{extract_report, fold_sql_results, format_errors};
use crate::llm::{CompletionRequest, DEFAULT_MAX_TOKENS, LlmClient};
use crate::prompts::{PromptLoader, REPORT_WRITER};
use crate::state::{NO_INFO, NO_REPORT, StateUpdate, WorkflowState};

pub struct ReportWriter {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    max_iterations: u32,
    max_tokens: u32,
}

impl ReportWriter {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: &PromptLoader, max_iterations: u32) -> eyre::Result<Self> {
        debug!(max_iterations, "ReportWriter::new: called");
        Ok(Self {
            llm,
            system_prompt: prompts.load_template(REPORT_WRITER)?,
            max_iterations,
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Accumulated narrative, the plan and any results not yet folded in
    fn information(state: &WorkflowState) -> String {
        let mut info = state.info.clone();
        if let Some(plan) = state.plan.as_deref().filter(|p| !p.trim().is_empty()) {
            info.push_str(&format!("Plan:\n{}\n\n", plan));
        }
        info.push_str(&fold_sql_results(&state.sql_results));
        if info.trim().is_empty() {
            NO_INFO.to_string()
        } else {
            info
        }
    }

    fn user_prompt(state: &WorkflowState) -> String {
        let mut prompt = format!(
            "Information retrieved so far:\n{}\n\n The report generated so far:\n{}\n\n\
             If the report hasn't been generated yet, write it from scratch using the information above. \
             Otherwise, improve and extend the existing report with the new information.\n",
            Self::information(state),
            state.report_text().unwrap_or(NO_REPORT),
        );
        if let Some(instruction) = state.query_for_agent.as_deref().filter(|q| !q.trim().is_empty()) {
            prompt.push_str(&format!("\nInstruction: {}\n", instruction));
        }
        prompt.push_str("\nREPORT_START:");
        prompt
    }

    /// Produce or refine `full_report`
    pub async fn run(&self, state: &WorkflowState) -> StateUpdate {
        debug!(version = state.version, "ReportWriter::run: called");
        let user_prompt = Self::user_prompt(state);
        let mut errors: Vec<String> = Vec::new();

        for iteration in 1..=self.max_iterations {
            let request =
                CompletionRequest::new(self.system_prompt.clone(), user_prompt.clone()).with_max_tokens(self.max_tokens);

            match self.llm.complete(request).await {
                Ok(response) => match response.non_empty_text().and_then(extract_report) {
                    Some(report) => {
                        info!(iteration, report_len = report.len(), "Report generated");
                        return StateUpdate {
                            full_report: Some(report),
                            ..Default::default()
                        };
                    }
                    None => {
                        warn!(iteration, "ReportWriter::run: no markdown heading in response");
                        errors.push("No markdown heading was found in the response".to_string());
                    }
                },
                Err(e) => {
                    warn!(iteration, error = %e, "ReportWriter::run: gateway error");
                    errors.push(e.to_string());
                }
            }
        }

        StateUpdate {
            report_error: Some(format!(
                "Failed to generate the report after {} iterations.\nErrors: {}",
                self.max_iterations,
                format_errors(&errors)
            )),
            ..Default::default()
        }
    }
}
