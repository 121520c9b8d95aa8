//! Natural-language answers for result sets: model explanation first,
//! deterministic template otherwise.

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::api::middleware::AppError;
use crate::models::{ResultSet, Schema};
use crate::services::llm_service::TextGenerator;
use crate::services::prompt;
use crate::services::table_extractor::extract_tables;

pub const NO_RESULTS: &str = "No results found for your query.";

lazy_static! {
    static ref NOT_EXISTS: Regex = Regex::new(r"(?i)\bnot\s+exists\b").unwrap();
}

/// Everything a summary may draw on
pub struct SummaryInput<'a> {
    pub rows: &'a ResultSet,
    pub question: &'a str,
    pub sql: &'a str,
    pub schema: &'a Schema,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub answer: String,
    pub from_model: bool,
}

#[async_trait::async_trait]
pub trait SummaryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_model(&self) -> bool {
        false
    }

    async fn attempt(&self, input: &SummaryInput<'_>) -> Result<Option<String>, AppError>;
}

pub struct ModelSummaryStrategy {
    generator: Arc<dyn TextGenerator>,
}

impl ModelSummaryStrategy {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait::async_trait]
impl SummaryStrategy for ModelSummaryStrategy {
    fn name(&self) -> &'static str {
        "model"
    }

    fn is_model(&self) -> bool {
        true
    }

    async fn attempt(&self, input: &SummaryInput<'_>) -> Result<Option<String>, AppError> {
        if !self.generator.is_configured() {
            return Ok(None);
        }

        let prompt = prompt::summary_prompt(input.question, input.sql, input.schema, input.rows);
        let text = self.generator.generate(&prompt).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::LlmService("Model returned an empty explanation".to_string()));
        }
        Ok(Some(text.to_string()))
    }
}

pub struct TemplateSummaryStrategy;

#[async_trait::async_trait]
impl SummaryStrategy for TemplateSummaryStrategy {
    fn name(&self) -> &'static str {
        "template"
    }

    async fn attempt(&self, input: &SummaryInput<'_>) -> Result<Option<String>, AppError> {
        Ok(Some(baseline_summary(input.rows, input.question, input.sql)))
    }
}

pub struct ResultSummarizer {
    strategies: Vec<Box<dyn SummaryStrategy>>,
}

impl ResultSummarizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            strategies: vec![
                Box::new(ModelSummaryStrategy::new(generator)),
                Box::new(TemplateSummaryStrategy),
            ],
        }
    }

    pub async fn summarize(&self, rows: &ResultSet, question: &str, sql: &str, schema: &Schema) -> Summary {
        if rows.is_empty() {
            return Summary {
                answer: empty_summary(sql),
                from_model: false,
            };
        }

        let input = SummaryInput {
            rows,
            question,
            sql,
            schema,
        };
        for strategy in &self.strategies {
            match strategy.attempt(&input).await {
                Ok(Some(answer)) => {
                    return Summary {
                        answer,
                        from_model: strategy.is_model(),
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("{} summary failed, using next strategy: {}", strategy.name(), e),
            }
        }

        Summary {
            answer: baseline_summary(rows, question, sql),
            from_model: false,
        }
    }
}

/// Tables of an EXISTS-based relationship query
#[derive(Debug, Clone, PartialEq, Eq)]
struct Relationship {
    entity: String,
    related: String,
    /// `NOT EXISTS`: entities without any related row
    negated: bool,
}

fn relationship(sql: &str) -> Option<Relationship> {
    if !sql.to_lowercase().contains("exists") {
        return None;
    }
    let mut tables = extract_tables(sql).into_iter();
    Some(Relationship {
        entity: tables.next()?,
        related: tables.next()?,
        negated: NOT_EXISTS.is_match(sql),
    })
}

fn singular(name: &str) -> &str {
    match name.strip_suffix('s') {
        Some(stem) if !stem.is_empty() => stem,
        _ => name,
    }
}

fn empty_summary(sql: &str) -> String {
    match relationship(sql) {
        Some(rel) if rel.negated => format!(
            "Every {} has at least one related {}.",
            singular(&rel.entity),
            singular(&rel.related)
        ),
        Some(rel) => format!("No {} currently have any related {}.", rel.entity, rel.related),
        None => NO_RESULTS.to_string(),
    }
}

/// Deterministic summary of a non-empty result set
pub fn baseline_summary(rows: &ResultSet, question: &str, sql: &str) -> String {
    if rows.is_empty() {
        return empty_summary(sql);
    }

    if let Some(rel) = relationship(sql) {
        let names: Vec<String> = rows
            .iter()
            .filter_map(|row| match row.get("name") {
                Some(Value::String(name)) => Some(name.clone()),
                Some(Value::Null) | None => None,
                Some(other) => Some(other.to_string()),
            })
            .collect();
        let single = rows.len() == 1;
        let entity = if single { singular(&rel.entity) } else { rel.entity.as_str() };
        let verb = if single { "has" } else { "have" };
        let mut summary = if rel.negated {
            format!("Found {} {} who {} no {}", rows.len(), entity, verb, rel.related)
        } else {
            format!(
                "Found {} {} who {} at least one {}",
                rows.len(),
                entity,
                verb,
                singular(&rel.related)
            )
        };
        if !names.is_empty() {
            summary.push_str(&format!(": {}", names.join(", ")));
        }
        summary.push('.');
        return summary;
    }

    let columns: Vec<&str> = rows[0].keys().map(String::as_str).collect();
    format!(
        "Found {} {} for your query \"{}\". Each record contains the following information: {}.",
        rows.len(),
        if rows.len() == 1 { "result" } else { "results" },
        question.trim(),
        columns.join(", ")
    )
}
