//! Deterministic keyword matcher used whenever the model path is unavailable.
//!
//! Rules are tried in order and tables are scanned in schema order; the first
//! rule and table that match win.

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::{Schema, Table};

lazy_static! {
    static ref AGGREGATE_CUE: Regex = Regex::new(r"\bhow many\b|\bcount\b").unwrap();
    static ref LISTING_CUE: Regex = Regex::new(r"\b(?:all|list|show|get)\b").unwrap();
    static ref ID_LITERAL: Regex = Regex::new(r"\bid\s*[:=]?\s*(\d+)\b|#(\d+)\b").unwrap();
    static ref NAME_LITERAL: Regex = Regex::new(r#"(?i)\bnamed?\s+(?:'([^']+)'|"([^"]+)")"#).unwrap();
}

/// Shortest token considered by the substring fallback; shorter words
/// ("a", "is") would match almost any table name.
const MIN_TOKEN_LEN: usize = 3;

/// Convert a question into a SELECT statement using only the schema.
pub fn rule_based_sql(question: &str, schema: &Schema) -> String {
    let Some(first_table) = schema.tables.first() else {
        return "SELECT 1".to_string();
    };
    let normalized = question.trim().to_lowercase();

    if AGGREGATE_CUE.is_match(&normalized) {
        if let Some(table) = first_named_table(&normalized, schema) {
            return format!("SELECT COUNT(*) FROM {}", table.name);
        }
    }

    if LISTING_CUE.is_match(&normalized) {
        if let Some(table) = first_named_table(&normalized, schema) {
            let columns = mentioned_columns(&normalized, table);
            return if columns.is_empty() {
                format!("SELECT * FROM {}", table.name)
            } else {
                format!("SELECT {} FROM {}", columns.join(", "), table.name)
            };
        }
    }

    if let Some(table) = schema.tables.iter().find(|t| asks_for_record(&normalized, t)) {
        return record_lookup(question, &normalized, table);
    }

    let tokens = normalized
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| token.len() >= MIN_TOKEN_LEN);
    for token in tokens {
        let hit = schema.tables.iter().find(|table| {
            let name = table.name.to_lowercase();
            name.contains(token) || token.contains(&name)
        });
        if let Some(table) = hit {
            return format!("SELECT * FROM {} LIMIT 10", table.name);
        }
    }

    format!("SELECT * FROM {} LIMIT 10", first_table.name)
}

/// First table named directly or by its singular form
fn first_named_table<'a>(normalized: &str, schema: &'a Schema) -> Option<&'a Table> {
    schema.tables.iter().find(|table| {
        normalized.contains(&table.name.to_lowercase()) || normalized.contains(&table.singular_name())
    })
}

/// Columns of `table` that the question mentions as whole words. Underscored
/// names also match with spaces (`phone number` for `phone_number`).
fn mentioned_columns(normalized: &str, table: &Table) -> Vec<String> {
    table
        .columns
        .iter()
        .filter(|column| {
            let name = column.name.to_lowercase();
            contains_word(normalized, &name) || (name.contains('_') && contains_word(normalized, &name.replace('_', " ")))
        })
        .map(|column| column.name.clone())
        .collect()
}

fn contains_word(haystack: &str, word: &str) -> bool {
    Regex::new(&format!(r"\b{}\b", regex::escape(word)))
        .map(|re| re.is_match(haystack))
        .unwrap_or(false)
}

/// `find|get|show <table>`, with the table named in plural or singular form
fn asks_for_record(normalized: &str, table: &Table) -> bool {
    let name = regex::escape(&table.name.to_lowercase());
    let singular = regex::escape(&table.singular_name());
    Regex::new(&format!(r"\b(?:find|get|show)\s+(?:the\s+)?(?:{}|{})\b", name, singular))
        .map(|re| re.is_match(normalized))
        .unwrap_or(false)
}

fn record_lookup(question: &str, normalized: &str, table: &Table) -> String {
    if let Some(caps) = ID_LITERAL.captures(normalized) {
        if let Some(id) = caps.get(1).or_else(|| caps.get(2)) {
            return format!("SELECT * FROM {} WHERE id = {}", table.name, id.as_str());
        }
    }

    // Match against the original text so the literal keeps its casing
    if let Some(caps) = NAME_LITERAL.captures(question) {
        if let Some(name) = caps.get(1).or_else(|| caps.get(2)) {
            return format!(
                "SELECT * FROM {} WHERE name LIKE '{}'",
                table.name,
                name.as_str().replace('\'', "''")
            );
        }
    }

    format!("SELECT * FROM {} LIMIT 10", table.name)
}
