use serde::{Deserialize, Serialize};

use super::query::Row;

/// Where a resolved schema came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaOrigin {
    Live,
    Fallback,
}

/// Structural description of the tables available to a question.
/// Table order is presentation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub tables: Vec<Table>,
    pub origin: SchemaOrigin,
    pub retrieved_at: chrono::DateTime<chrono::Utc>,
}

impl Schema {
    pub fn new(tables: Vec<Table>, origin: SchemaOrigin) -> Self {
        Self {
            tables,
            origin,
            retrieved_at: chrono::Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Case-insensitive lookup; table names keep the store's casing.
    pub fn find_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub columns: Vec<Column>,
    /// A handful of rows used to ground prompts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_data: Vec<Row>,
}

impl Table {
    pub fn new(name: impl Into<String>, description: Option<&str>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            description: description.map(str::to_string),
            columns,
            sample_data: Vec::new(),
        }
    }

    pub fn with_sample_data(mut self, rows: Vec<Row>) -> Self {
        self.sample_data = rows;
        self
    }

    /// Lower-cased name with one trailing `s` removed
    pub fn singular_name(&self) -> String {
        let lower = self.name.to_lowercase();
        match lower.strip_suffix('s') {
            Some(stem) if !stem.is_empty() => stem.to_string(),
            _ => lower,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, description: Option<&str>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            description: description.map(str::to_string),
        }
    }
}
