use std::sync::Arc;

use super::SqlStrategy;
use crate::api::middleware::AppError;
use crate::models::{GeneratedQuery, Provenance, Schema};
use crate::services::llm_service::{strip_code_fences, TextGenerator};
use crate::services::prompt;

/// Schema-grounded generation through the language model. One call, no retry.
pub struct ModelSqlStrategy {
    generator: Arc<dyn TextGenerator>,
}

impl ModelSqlStrategy {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait::async_trait]
impl SqlStrategy for ModelSqlStrategy {
    fn name(&self) -> &'static str {
        "model"
    }

    async fn attempt(&self, question: &str, schema: &Schema) -> Result<Option<GeneratedQuery>, AppError> {
        if !self.generator.is_configured() {
            tracing::debug!("Language model not configured, skipping model generation");
            return Ok(None);
        }

        let prompt = prompt::sql_generation_prompt(question, schema);
        let response = self.generator.generate(&prompt).await?;
        let sql = strip_code_fences(&response);

        if !sql.to_lowercase().starts_with("select") {
            return Err(AppError::LlmService(format!(
                "Model returned a non-SELECT response: {}",
                sql.chars().take(80).collect::<String>()
            )));
        }

        tracing::info!("Generated SQL with language model: {}", sql);
        Ok(Some(GeneratedQuery::new(sql, Provenance::Model)))
    }
}
