//! Best-effort table reference extraction from SQL text.
//!
//! This is token matching over the lower-cased statement, not a SQL parser.
//! It finds identifiers after `FROM` and `JOIN` (including comma-separated
//! `FROM` lists and the `FROM` of `EXISTS (SELECT ...)` subqueries), strips
//! schema qualifiers and separates aliases. Quoted identifiers containing
//! spaces, `FROM` inside string literals or comments, and deeper nesting are
//! known precision limits.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref TABLE_REF: Regex = Regex::new(
        r#"(?x)
        \b(?P<kw>from|join)\s+
        "?(?P<first>[a-z_][a-z0-9_$]*)"?
        (?:\s*\.\s*"?(?P<second>[a-z_][a-z0-9_$]*)"?)?
        (?:\s+(?:as\s+)?(?P<alias>[a-z_][a-z0-9_]*))?
        "#
    )
    .unwrap();
    static ref NEXT_LIST_ITEM: Regex = Regex::new(
        r#"(?x)
        ^\s*,\s*
        "?(?P<first>[a-z_][a-z0-9_$]*)"?
        (?:\s*\.\s*"?(?P<second>[a-z_][a-z0-9_$]*)"?)?
        (?:\s+(?:as\s+)?(?P<alias>[a-z_][a-z0-9_]*))?
        "#
    )
    .unwrap();
}

/// Words that can follow a table name without being its alias
const RESERVED: &[&str] = &[
    "all", "and", "as", "by", "cross", "except", "fetch", "for", "from", "full", "group", "having",
    "inner", "intersect", "join", "lateral", "left", "limit", "natural", "offset", "on", "only",
    "or", "order", "outer", "right", "select", "union", "using", "where", "window",
];

/// Functions whose argument syntax uses `FROM` without naming a table
const FROM_FUNCTIONS: &[&str] = &["extract", "substring", "trim", "position", "overlay"];

/// A referenced table and the alias it was given, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReference {
    pub table: String,
    pub alias: Option<String>,
}

/// Distinct table names referenced by `sql`, in order of discovery
pub fn extract_tables(sql: &str) -> Vec<String> {
    let mut tables: Vec<String> = Vec::new();
    for reference in extract_table_references(sql) {
        if !tables.contains(&reference.table) {
            tables.push(reference.table);
        }
    }
    tables
}

/// Every table/alias pair in order of discovery, duplicates included
pub fn extract_table_references(sql: &str) -> Vec<TableReference> {
    let lower = sql.to_lowercase();
    let mut references = Vec::new();
    let mut pos = 0;

    // Resume each search where the previous reference really ended, so a
    // keyword such as JOIN is never swallowed as an alias
    while let Some(caps) = TABLE_REF.captures_at(&lower, pos) {
        let (Some(whole), Some(first)) = (caps.get(0), caps.name("first")) else {
            break;
        };
        if inside_from_function(&lower, whole.start()) {
            pos = first.end();
            continue;
        }

        let Some((reference, mut end)) = reference_from(&caps) else {
            pos = first.end();
            continue;
        };
        references.push(reference);

        if &caps["kw"] == "from" {
            while let Some(next) = NEXT_LIST_ITEM.captures(&lower[end..]) {
                let Some((reference, consumed)) = reference_from(&next) else {
                    break;
                };
                references.push(reference);
                end += consumed;
            }
        }
        pos = end;
    }

    references
}

/// Build a reference from a match; returns it with the byte offset where the
/// match really ends (excluding a keyword mistaken for an alias)
fn reference_from(caps: &Captures<'_>) -> Option<(TableReference, usize)> {
    let first = caps.name("first")?;
    if RESERVED.contains(&first.as_str()) {
        return None;
    }
    let name = caps.name("second").unwrap_or(first);

    let (alias, end) = match caps.name("alias") {
        Some(alias) if !RESERVED.contains(&alias.as_str()) => (Some(alias.as_str().to_string()), alias.end()),
        _ => (None, name_end(caps, name.end())),
    };

    Some((
        TableReference {
            table: name.as_str().to_string(),
            alias,
        },
        end,
    ))
}

/// End of the table name, including a closing quote if present
fn name_end(caps: &Captures<'_>, end: usize) -> usize {
    let text = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
    let offset = caps.get(0).map(|m| m.start()).unwrap_or_default();
    match text.as_bytes().get(end - offset) {
        Some(b'"') => end + 1,
        _ => end,
    }
}

/// True when `pos` sits inside the parentheses of e.g. `EXTRACT(YEAR FROM ts)`
fn inside_from_function(sql: &str, pos: usize) -> bool {
    let mut depth = 0i32;
    for (idx, ch) in sql[..pos].char_indices().rev() {
        match ch {
            ')' => depth += 1,
            '(' if depth > 0 => depth -= 1,
            '(' => {
                let before = sql[..idx].trim_end();
                return FROM_FUNCTIONS.iter().any(|f| {
                    before.ends_with(f)
                        && !before[..before.len() - f.len()]
                            .chars()
                            .last()
                            .is_some_and(|c| c.is_alphanumeric() || c == '_')
                });
            }
            _ => {}
        }
    }
    false
}
