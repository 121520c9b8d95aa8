use serde::{Deserialize, Serialize};

use super::schema::{Column, Schema};

/// One result row keyed by column name
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Ordered result rows. Empty is a valid answer, distinct from an error.
pub type ResultSet = Vec<Row>;

/// Which generation strategy produced a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Model,
    RuleBased,
    DirectPattern,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Model => "model",
            Provenance::RuleBased => "rule-based",
            Provenance::DirectPattern => "direct-pattern",
        }
    }
}

/// A single read-only statement plus the strategy that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuery {
    pub sql: String,
    pub provenance: Provenance,
}

impl GeneratedQuery {
    pub fn new(sql: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            sql: sql.into(),
            provenance,
        }
    }
}

/// Whether returned rows came from the live store or the fixtures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataOrigin {
    Live,
    Mock,
}

/// Pipeline progress for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStage {
    Idle,
    SchemaResolved,
    SqlGenerated,
    Executed,
    Summarized,
    Done,
    Errored,
}

/// A schema table flagged with whether the final SQL referenced it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatedTable {
    pub name: String,
    pub columns: Vec<Column>,
    pub queried: bool,
}

impl AnnotatedTable {
    pub fn annotate(schema: &Schema, referenced: &[String]) -> Vec<AnnotatedTable> {
        schema
            .tables
            .iter()
            .map(|table| AnnotatedTable {
                name: table.name.clone(),
                columns: table.columns.clone(),
                queried: referenced.iter().any(|r| r.eq_ignore_ascii_case(&table.name)),
            })
            .collect()
    }
}

/// The pipeline's output contract, built once per request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub answer: String,
    pub sql: Option<String>,
    pub provenance: Option<Provenance>,
    pub data: Option<ResultSet>,
    pub data_source: Option<DataOrigin>,
    pub schema_annotated: Vec<AnnotatedTable>,
    pub source_status: String,
    pub stage: PipelineStage,
}

impl QueryResponse {
    /// A response that stopped before producing data
    pub fn errored(answer: impl Into<String>, source_status: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            sql: None,
            provenance: None,
            data: None,
            data_source: None,
            schema_annotated: Vec::new(),
            source_status: source_status.into(),
            stage: PipelineStage::Errored,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NaturalLanguageQueryRequest {
    #[serde(default, alias = "query")]
    pub question: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SchemaOrigin, Table};

    #[test]
    fn test_provenance_serialization() {
        assert_eq!(
            serde_json::to_value(Provenance::RuleBased).unwrap(),
            serde_json::json!("rule-based")
        );
        assert_eq!(Provenance::DirectPattern.as_str(), "direct-pattern");
    }

    #[test]
    fn test_response_uses_camel_case() {
        let response = QueryResponse::errored("Please provide a question.", "error");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["sourceStatus"], "error");
        assert_eq!(json["stage"], "errored");
        assert!(json["sql"].is_null());
        assert!(json["data"].is_null());
        assert!(json["schemaAnnotated"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_annotate_marks_referenced_tables() {
        let schema = Schema::new(
            vec![
                Table::new("doctors", None, vec![]),
                Table::new("patients", None, vec![]),
                Table::new("hospitals", None, vec![]),
            ],
            SchemaOrigin::Fallback,
        );
        let annotated = AnnotatedTable::annotate(&schema, &["Patients".to_string()]);
        let flags: Vec<(&str, bool)> = annotated.iter().map(|t| (t.name.as_str(), t.queried)).collect();
        assert_eq!(flags, vec![("doctors", false), ("patients", true), ("hospitals", false)]);
    }

    #[test]
    fn test_request_accepts_query_alias() {
        let request: NaturalLanguageQueryRequest =
            serde_json::from_str(r#"{"query": "list all hospitals"}"#).unwrap();
        assert_eq!(request.question.as_deref(), Some("list all hospitals"));

        let request: NaturalLanguageQueryRequest = serde_json::from_str("{}").unwrap();
        assert!(request.question.is_none());
    }
}
