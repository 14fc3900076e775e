//! Partial state updates returned by steps

use super::workflow::{NextAgent, SqlResults};

/// How a step changes `sql_results`
#[derive(Debug, Clone, PartialEq)]
pub enum ResultsUpdate {
    /// Insert entries, overwriting any with the same question
    Merge(SqlResults),
    /// Clear every entry
    Reset,
}

/// Fields a step wants to change; `None` leaves the field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub process_data: Option<bool>,
    pub receipt: Option<String>,
    pub result: Option<String>,
    pub query: Option<String>,
    pub answer: Option<String>,

    pub plan: Option<String>,
    pub next_agent: Option<NextAgent>,
    pub query_for_agent: Option<String>,
    pub sql_results: Option<ResultsUpdate>,
    pub info: Option<String>,
    pub full_report: Option<String>,

    pub plan_errors: Option<String>,
    pub user_query_error: Option<String>,
    pub report_error: Option<String>,
    pub sql_error: Option<String>,
}

impl StateUpdate {
    /// True if the update carries a terminal error field
    pub fn is_failure(&self) -> bool {
        self.plan_errors.is_some()
            || self.user_query_error.is_some()
            || self.report_error.is_some()
            || self.sql_error.is_some()
    }
}
