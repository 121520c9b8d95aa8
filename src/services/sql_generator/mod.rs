//! Question → SELECT statement, as an ordered list of strategies:
//! direct patterns, then the language model, then the rule-based matcher.

pub mod direct_patterns;
pub mod model;
pub mod rule_based;

pub use direct_patterns::match_direct_pattern;
pub use model::ModelSqlStrategy;
pub use rule_based::rule_based_sql;

use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::models::{GeneratedQuery, Provenance, Schema};
use crate::services::llm_service::TextGenerator;

/// One way of producing SQL. `Ok(None)` declines, `Err` is a failure that
/// lets the next strategy run.
#[async_trait::async_trait]
pub trait SqlStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn attempt(&self, question: &str, schema: &Schema) -> Result<Option<GeneratedQuery>, AppError>;
}

pub struct DirectPatternStrategy;

#[async_trait::async_trait]
impl SqlStrategy for DirectPatternStrategy {
    fn name(&self) -> &'static str {
        "direct-pattern"
    }

    async fn attempt(&self, question: &str, schema: &Schema) -> Result<Option<GeneratedQuery>, AppError> {
        let normalized = question.trim().to_lowercase();
        Ok(match_direct_pattern(&normalized, schema).map(|sql| GeneratedQuery::new(sql, Provenance::DirectPattern)))
    }
}

pub struct RuleBasedStrategy;

#[async_trait::async_trait]
impl SqlStrategy for RuleBasedStrategy {
    fn name(&self) -> &'static str {
        "rule-based"
    }

    async fn attempt(&self, question: &str, schema: &Schema) -> Result<Option<GeneratedQuery>, AppError> {
        Ok(Some(GeneratedQuery::new(rule_based_sql(question, schema), Provenance::RuleBased)))
    }
}

pub struct SqlGenerator {
    strategies: Vec<Box<dyn SqlStrategy>>,
}

impl SqlGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self::with_strategies(vec![
            Box::new(DirectPatternStrategy),
            Box::new(ModelSqlStrategy::new(generator)),
            Box::new(RuleBasedStrategy),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn SqlStrategy>>) -> Self {
        Self { strategies }
    }

    /// Always yields a SELECT statement; `SELECT 1` when the schema has no tables.
    pub async fn generate_sql(&self, question: &str, schema: &Schema) -> GeneratedQuery {
        if schema.is_empty() {
            return GeneratedQuery::new("SELECT 1", Provenance::RuleBased);
        }

        for strategy in &self.strategies {
            match strategy.attempt(question, schema).await {
                Ok(Some(query)) => {
                    tracing::debug!("SQL produced by {} strategy: {}", strategy.name(), query.sql);
                    return query;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("{} strategy failed, trying next: {}", strategy.name(), e);
                }
            }
        }

        GeneratedQuery::new(rule_based_sql(question, schema), Provenance::RuleBased)
    }
}
