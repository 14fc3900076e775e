//! Supervisor Planner
//!
//! Decides which worker runs next. The model answers with a JSON object
//! carrying `plan`, `next_agent` and `query_for_agent`. Exact keys are looked
//! up first; when one is absent, the first key containing `plan`, `next` or
//! `query` is used instead. That fallback keeps older prompt variants working
//! and can bind the wrong field when the model emits look-alike keys.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{JsonExtractError, extract_json_object, fold_sql_results, format_errors};
use crate::llm::{CompletionRequest, DEFAULT_MAX_TOKENS, LlmClient};
use crate::prompts::{PromptLoader, SUPERVISOR};
use crate::state::{NO_INFO, NO_REPORT, NextAgent, ResultsUpdate, StateUpdate, WorkflowState};

/// Error recorded when a field is absent from the decoded object
pub const MISSING_KEYS: &str = "Invalid JSON structure: Missing required keys";

/// Error recorded for an empty `user_query`
pub const USER_QUERY_MISSING: &str = "User query is not specified";

/// The three fields of a successful plan
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub plan: String,
    pub next_agent: NextAgent,
    pub query_for_agent: String,
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn field(map: &Map<String, Value>, exact: &str, fragment: &str) -> Option<String> {
    if let Some(value) = map.get(exact) {
        return as_text(value);
    }
    map.iter()
        .find(|(key, _)| key.to_ascii_lowercase().contains(fragment))
        .and_then(|(_, value)| as_text(value))
}

impl Directive {
    /// Bind the decoded object to the three plan fields
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, String> {
        let plan = field(map, "plan", "plan");
        let next = field(map, "next_agent", "next");
        let query = field(map, "query_for_agent", "query");

        let (Some(plan), Some(next), Some(query_for_agent)) = (plan, next, query) else {
            return Err(MISSING_KEYS.to_string());
        };
        let next_agent = next
            .parse::<NextAgent>()
            .map_err(|e| format!("Invalid JSON structure: {}", e))?;

        Ok(Self {
            plan,
            next_agent,
            query_for_agent,
        })
    }
}

pub struct Supervisor {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    max_iterations: u32,
    max_tokens: u32,
}

impl Supervisor {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: &PromptLoader, max_iterations: u32) -> eyre::Result<Self> {
        debug!(max_iterations, "Supervisor::new: called");
        Ok(Self {
            llm,
            system_prompt: prompts.load_template(SUPERVISOR)?,
            max_iterations,
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn base_prompt(user_query: &str, info: &str, state: &WorkflowState) -> String {
        let shown_info = if info.trim().is_empty() { NO_INFO } else { info };
        format!(
            "Main user query: '{}'\n\nInformation retrieved so far:\n{}\n\n Report generated so far:\n{}\n\n\
             Decide the next step and answer only with the JSON object.",
            user_query,
            shown_info,
            state.report_text().unwrap_or(NO_REPORT),
        )
    }

    /// Plan the next step from everything retrieved so far
    pub async fn run(&self, state: &WorkflowState) -> StateUpdate {
        let user_query = state.user_query.as_deref().map(str::trim).unwrap_or_default();
        debug!(%user_query, version = state.version, "Supervisor::run: called");

        if user_query.is_empty() {
            return StateUpdate {
                user_query_error: Some(USER_QUERY_MISSING.to_string()),
                ..Default::default()
            };
        }

        let info = format!("{}{}", state.info, fold_sql_results(&state.sql_results));
        let base_prompt = Self::base_prompt(user_query, &info, state);
        let mut errors: Vec<String> = Vec::new();

        for iteration in 1..=self.max_iterations {
            let mut prompt = base_prompt.clone();
            if let Some(last) = errors.last() {
                prompt.push_str(&format!(
                    "\n\nFor your previous output, the following error was observed:\n{}\nPlease fix it.",
                    last
                ));
            }
            let request = CompletionRequest::new(self.system_prompt.clone(), prompt).with_max_tokens(self.max_tokens);

            let text = match self.llm.complete(request).await {
                Ok(response) => response.non_empty_text().map(str::to_string),
                Err(e) => {
                    warn!(iteration, error = %e, "Supervisor::run: gateway error");
                    errors.push(e.to_string());
                    continue;
                }
            };

            let parsed = text
                .as_deref()
                .ok_or(JsonExtractError::NotFound)
                .and_then(extract_json_object)
                .map_err(|e| e.to_string())
                .and_then(|map| Directive::from_map(&map));

            match parsed {
                Ok(directive) => {
                    info!(iteration, next_agent = %directive.next_agent, "Plan decided");
                    return StateUpdate {
                        plan: Some(directive.plan),
                        next_agent: Some(directive.next_agent),
                        query_for_agent: Some(directive.query_for_agent),
                        sql_results: Some(ResultsUpdate::Reset),
                        info: Some(info),
                        ..Default::default()
                    };
                }
                Err(reason) => {
                    warn!(iteration, %reason, "Supervisor::run: unusable plan");
                    errors.push(reason);
                }
            }
        }

        StateUpdate {
            plan_errors: Some(format!(
                "Failed to generate a correct JSON plan after {} iterations.\nErrors: {}",
                self.max_iterations,
                format_errors(&errors)
            )),
            ..Default::default()
        }
    }
}
