//! Receipt text to insert statement

use std::sync::Arc;

use tracing::{debug, info};

use super::error::ReceiptError;
use crate::agents::extract_sql;
use crate::llm::{CompletionRequest, DEFAULT_MAX_TOKENS, LlmClient};
use crate::prompts::{PromptLoader, RECEIPT_EXTRACTION, ReceiptContext};

const INSERT_PREFIX: &str = "insert into invoices";

/// Asks the gateway for one `INSERT INTO invoices` statement per receipt
pub struct ReceiptExtractor {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    max_tokens: u32,
}

impl ReceiptExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>) -> Self {
        Self {
            llm,
            prompts,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Render the extraction prompt for `text` and return the cleaned statement
    pub async fn to_insert_statement(&self, text: &str) -> Result<String, ReceiptError> {
        debug!(text_len = text.len(), "ReceiptExtractor::to_insert_statement: called");
        if text.trim().is_empty() {
            return Err(ReceiptError::EmptyDocument);
        }

        let prompt = self
            .prompts
            .render(
                RECEIPT_EXTRACTION,
                &ReceiptContext {
                    receipt: text.to_string(),
                },
            )
            .map_err(|e| ReceiptError::Prompt(e.to_string()))?;

        let request = CompletionRequest::new("", prompt).with_max_tokens(self.max_tokens);
        let response = self.llm.complete(request).await?;
        let raw = response.non_empty_text().unwrap_or_default();

        let statement = clean_statement(raw).ok_or_else(|| ReceiptError::NotAnInsert(preview(raw)))?;
        info!(statement_len = statement.len(), "Receipt extracted");
        Ok(statement)
    }
}

/// Strip fences, a leading `sql` word and a trailing period after the last `)`
fn clean_statement(raw: &str) -> Option<String> {
    let mut sql = extract_sql(raw)?;

    if let Some(head) = sql.get(..3)
        && head.eq_ignore_ascii_case("sql")
        && sql[3..].starts_with(char::is_whitespace)
    {
        sql = sql[3..].trim_start().to_string();
    }

    let trimmed = sql.trim_end();
    if let Some(close) = trimmed.rfind(')') {
        let tail = &trimmed[close + 1..];
        if tail.trim() == "." {
            sql = trimmed[..=close].to_string();
        }
    }

    let starts_with_insert = sql
        .get(..INSERT_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(INSERT_PREFIX));
    if starts_with_insert { Some(sql) } else { None }
}

fn preview(raw: &str) -> String {
    let first_line = raw.trim().lines().next().unwrap_or_default();
    first_line.chars().take(80).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::{MockLlmClient, MockReply};

    const STATEMENT: &str = "INSERT INTO invoices (invoice_id, supermarket_name, datetime, description, quantity, unit, \
        unitary_value, total_value, product, full_product_name, volume, category) VALUES \
        ('1', 'SuperNova', '2025-03-01', 'LTE', 2, 'Un', 5.0, 10.0, 'Leite', 'Leite Italac', '1L', 'Laticínios')";

    fn extractor(replies: Vec<MockReply>) -> (Arc<MockLlmClient>, ReceiptExtractor) {
        let llm = Arc::new(MockLlmClient::new(replies));
        let extractor = ReceiptExtractor::new(llm.clone(), Arc::new(PromptLoader::embedded_only()));
        (llm, extractor)
    }

    #[test]
    fn test_clean_statement_variants() {
        assert_eq!(clean_statement(STATEMENT).as_deref(), Some(STATEMENT));
        assert_eq!(
            clean_statement(&format!("```sql\n{}\n```", STATEMENT)).as_deref(),
            Some(STATEMENT)
        );
        assert_eq!(clean_statement(&format!("sql {}", STATEMENT)).as_deref(), Some(STATEMENT));
        assert_eq!(clean_statement(&format!("{}.", STATEMENT)).as_deref(), Some(STATEMENT));
        assert_eq!(
            clean_statement(&format!("{};", STATEMENT)).as_deref(),
            Some(format!("{};", STATEMENT).as_str())
        );
        assert!(clean_statement("DELETE FROM invoices").is_none());
        assert!(clean_statement("").is_none());
    }

    #[tokio::test]
    async fn test_to_insert_statement_renders_receipt() {
        let (llm, extractor) = extractor(vec![MockReply::text(format!("{}.", STATEMENT))]);

        let statement = extractor.to_insert_statement("LTE ITALAC 5,00").await.unwrap();
        assert_eq!(statement, STATEMENT);
        assert_eq!(llm.call_count(), 1);
        assert!(llm.requests()[0].user_prompt.contains("LTE ITALAC 5,00"));
    }

    #[tokio::test]
    async fn test_rejects_non_insert() {
        let (_, extractor) = extractor(vec![MockReply::text("I could not read this receipt.")]);
        let err = extractor.to_insert_statement("???").await.unwrap_err();
        assert!(matches!(err, ReceiptError::NotAnInsert(_)));
    }

    #[tokio::test]
    async fn test_gateway_error() {
        let (_, extractor) = extractor(vec![MockReply::Fail("down".to_string())]);
        let err = extractor.to_insert_statement("text").await.unwrap_err();
        assert!(matches!(err, ReceiptError::Gateway(_)));
    }

    #[tokio::test]
    async fn test_empty_text_skips_gateway() {
        let (llm, extractor) = extractor(vec![]);
        assert!(matches!(
            extractor.to_insert_statement("  ").await,
            Err(ReceiptError::EmptyDocument)
        ));
        assert_eq!(llm.call_count(), 0);
    }
}
