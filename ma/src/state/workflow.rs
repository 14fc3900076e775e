//! WorkflowState and the supervisor's routing decision

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use spendstore::Table;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::update::{ResultsUpdate, StateUpdate};

/// Report placeholder until the first successful report generation
pub const NO_REPORT: &str = "No report generated so far";

/// Shown to the models when nothing has been retrieved yet
pub const NO_INFO: &str = "No information retrieved yet.";

/// Question text to retrieved rows, in retrieval order
pub type SqlResults = IndexMap<String, Table>;

/// Which worker runs next, or whether the report is done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextAgent {
    #[serde(rename = "SQLAgent")]
    SqlAgent,
    #[serde(rename = "ReportWriterAgent")]
    ReportWriterAgent,
    #[serde(rename = "FINISH")]
    Finish,
}

impl NextAgent {
    pub fn as_str(&self) -> &'static str {
        match self {
            NextAgent::SqlAgent => "SQLAgent",
            NextAgent::ReportWriterAgent => "ReportWriterAgent",
            NextAgent::Finish => "FINISH",
        }
    }
}

impl fmt::Display for NextAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive; surrounding whitespace, quotes and backticks are ignored
impl FromStr for NextAgent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned = s.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`').trim();
        match cleaned.to_ascii_lowercase().as_str() {
            "sqlagent" => Ok(NextAgent::SqlAgent),
            "reportwriteragent" => Ok(NextAgent::ReportWriterAgent),
            "finish" => Ok(NextAgent::Finish),
            _ => Err(format!(
                "Invalid next_agent '{}': expected SQLAgent, ReportWriterAgent or FINISH",
                s
            )),
        }
    }
}

/// State of one top-level invocation
///
/// Every field is presence-driven. `user_query` is set when the state is
/// created and never changed by a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowState {
    /// Bumped on every merged update
    pub version: u64,

    // Ingestion / single-shot Q&A
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_data: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,

    // Report generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_agent: Option<NextAgent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_for_agent: Option<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub sql_results: SqlResults,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub info: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_report: Option<String>,

    // Terminal failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_errors: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_query_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_error: Option<String>,
}

impl WorkflowState {
    /// State for ingesting one receipt document
    pub fn for_receipt(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// State for one single-shot question
    pub fn for_question(question: impl Into<String>) -> Self {
        Self {
            question: Some(question.into()),
            ..Default::default()
        }
    }

    /// State for one report run
    pub fn for_report(user_query: impl Into<String>) -> Self {
        Self {
            user_query: Some(user_query.into()),
            ..Default::default()
        }
    }

    /// Merge a step's partial update
    pub fn apply(&mut self, update: StateUpdate) {
        debug!(version = self.version, "apply: called");
        let StateUpdate {
            process_data,
            receipt,
            result,
            query,
            answer,
            plan,
            next_agent,
            query_for_agent,
            sql_results,
            info,
            full_report,
            plan_errors,
            user_query_error,
            report_error,
            sql_error,
        } = update;

        set(&mut self.process_data, process_data);
        set(&mut self.receipt, receipt);
        set(&mut self.result, result);
        set(&mut self.query, query);
        set(&mut self.answer, answer);
        set(&mut self.plan, plan);
        set(&mut self.next_agent, next_agent);
        set(&mut self.query_for_agent, query_for_agent);
        set(&mut self.full_report, full_report);
        set(&mut self.plan_errors, plan_errors);
        set(&mut self.user_query_error, user_query_error);
        set(&mut self.report_error, report_error);
        set(&mut self.sql_error, sql_error);

        if let Some(info) = info {
            self.info = info;
        }

        match sql_results {
            Some(ResultsUpdate::Merge(results)) => {
                for (question, table) in results {
                    self.sql_results.insert(question, table);
                }
            }
            Some(ResultsUpdate::Reset) => self.sql_results.clear(),
            None => {}
        }

        self.version += 1;
    }

    /// The current report, unless it is still the placeholder
    pub fn report_text(&self) -> Option<&str> {
        self.full_report
            .as_deref()
            .filter(|r| !r.trim().is_empty() && r.trim() != NO_REPORT)
    }

    /// First terminal error field that is set
    pub fn terminal_error(&self) -> Option<&str> {
        self.user_query_error
            .as_deref()
            .or(self.plan_errors.as_deref())
            .or(self.sql_error.as_deref())
            .or(self.report_error.as_deref())
    }
}

fn set<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}
