use lazy_static::lazy_static;
use regex::Regex;
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::api::middleware::AppError;

lazy_static! {
    /// Write or lock clauses a SELECT can carry, matched on code text only
    static ref SELECT_SIDE_EFFECT: Regex = Regex::new(
        r"(?i)\binto\b|\bfor\s+(?:no\s+key\s+update|key\s+share|update|share)\b"
    )
    .unwrap();
}

/// Read-only enforcement for statements about to reach the store
pub struct SqlValidator;

impl SqlValidator {
    /// Ensure the statement is a single read-only SELECT.
    ///
    /// The prefix check is authoritative. When the statement also parses, every
    /// parsed statement must be a query without `INTO` or row locks, which
    /// rejects `SELECT 1; DROP TABLE x` and `SELECT * INTO copy FROM x`. Text
    /// the parser cannot handle is accepted only if it is a single statement.
    /// The clause check also runs on the raw text (literals and comments
    /// blanked) so nested or unparsed forms are caught too.
    pub fn validate_select_only(sql: &str) -> Result<String, AppError> {
        let trimmed = sql.trim();
        if !trimmed.to_lowercase().starts_with("select") {
            return Err(AppError::InvalidSql(
                "Only SELECT queries are allowed for security reasons".to_string(),
            ));
        }

        let statement = trimmed.trim_end_matches(';').trim_end();

        match Parser::parse_sql(&PostgreSqlDialect {}, statement) {
            Ok(ast) => {
                if ast.is_empty() {
                    return Err(AppError::InvalidSql("Empty SQL query".to_string()));
                }
                if let Some(stmt) = ast.iter().find(|s| !matches!(s, Statement::Query(_))) {
                    return Err(AppError::InvalidSql(format!(
                        "Only SELECT queries are permitted. Found: {}",
                        Self::statement_kind(stmt)
                    )));
                }
                if ast.len() > 1 {
                    return Err(AppError::InvalidSql(
                        "Multiple statements are not allowed".to_string(),
                    ));
                }
                if let Statement::Query(query) = &ast[0] {
                    Self::check_query(query)?;
                }
            }
            Err(e) => {
                if Self::has_trailing_statement(statement) {
                    return Err(AppError::InvalidSql(format!(
                        "Multiple statements are not allowed ({})",
                        e
                    )));
                }
                tracing::debug!("SQL parser could not handle statement, relying on text checks: {}", e);
            }
        }

        if let Some(clause) = SELECT_SIDE_EFFECT.find(&Self::code_only(statement)) {
            return Err(AppError::InvalidSql(format!(
                "'{}' is not allowed in a read-only query",
                clause.as_str().to_uppercase()
            )));
        }

        Ok(statement.to_string())
    }

    fn check_query(query: &Query) -> Result<(), AppError> {
        if !query.locks.is_empty() {
            return Err(AppError::InvalidSql(
                "Row locking clauses (FOR UPDATE / FOR SHARE) are not allowed".to_string(),
            ));
        }
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                Self::check_query(&cte.query)?;
            }
        }
        Self::check_set_expr(&query.body)
    }

    fn check_set_expr(body: &SetExpr) -> Result<(), AppError> {
        match body {
            SetExpr::Select(select) if select.into.is_some() => Err(AppError::InvalidSql(
                "SELECT INTO creates a table and is not allowed".to_string(),
            )),
            SetExpr::Select(_) | SetExpr::Values(_) | SetExpr::Table(_) => Ok(()),
            SetExpr::Query(query) => Self::check_query(query),
            SetExpr::SetOperation { left, right, .. } => {
                Self::check_set_expr(left)?;
                Self::check_set_expr(right)
            }
            other => Err(AppError::InvalidSql(format!(
                "Only read-only queries are permitted. Found: {}",
                other.to_string().split_whitespace().next().unwrap_or("UNKNOWN").to_uppercase()
            ))),
        }
    }

    fn statement_kind(stmt: &Statement) -> String {
        stmt.to_string()
            .split_whitespace()
            .next()
            .unwrap_or("UNKNOWN")
            .to_uppercase()
    }

    /// A `;` in code text followed by more code
    fn has_trailing_statement(sql: &str) -> bool {
        let code = Self::code_only(sql);
        match code.find(';') {
            Some(idx) => !code[idx + 1..].trim().is_empty(),
            None => false,
        }
    }

    /// The statement with string literals, quoted identifiers and comments
    /// replaced by spaces. Byte offsets are preserved.
    fn code_only(sql: &str) -> String {
        #[derive(Clone, Copy, PartialEq)]
        enum State {
            Code,
            Literal,
            Identifier,
            LineComment,
            BlockComment,
        }

        let bytes = sql.as_bytes();
        let mut out: Vec<u8> = Vec::with_capacity(sql.len());
        let mut state = State::Code;
        let mut i = 0;

        while i < bytes.len() {
            let b = bytes[i];
            let next = bytes.get(i + 1).copied();
            let (keep, next_state, width) = match state {
                State::Code => match (b, next) {
                    (b'\'', _) => (false, State::Literal, 1),
                    (b'"', _) => (false, State::Identifier, 1),
                    (b'-', Some(b'-')) => (false, State::LineComment, 2),
                    (b'/', Some(b'*')) => (false, State::BlockComment, 2),
                    _ => (true, State::Code, 1),
                },
                State::Literal => (false, if b == b'\'' { State::Code } else { State::Literal }, 1),
                State::Identifier => (false, if b == b'"' { State::Code } else { State::Identifier }, 1),
                State::LineComment => (b == b'\n', if b == b'\n' { State::Code } else { State::LineComment }, 1),
                State::BlockComment => match (b, next) {
                    (b'*', Some(b'/')) => (false, State::Code, 2),
                    _ => (false, State::BlockComment, 1),
                },
            };

            // Masked bytes become spaces one for one, so multi-byte
            // characters stay whole or vanish whole
            if keep {
                out.push(b);
            } else {
                out.extend(std::iter::repeat(b' ').take(width.min(bytes.len() - i)));
            }
            state = next_state;
            i += width;
        }

        String::from_utf8_lossy(&out).into_owned()
    }
}
