//! Read-only execution with live → mock data sources.

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

use crate::api::middleware::AppError;
use crate::models::{DataOrigin, GeneratedQuery, ResultSet};
use crate::services::database::LiveStore;
use crate::services::fixtures;
use crate::validation::SqlValidator;

lazy_static! {
    static ref EMAIL_PREDICATE: Regex = Regex::new(r"(?i)\b((?:\w+\.)?\w*email)\s*=\s*'([^']+)'").unwrap();
    static ref FROM_TABLE: Regex = Regex::new(r#"(?i)\bfrom\s+(?:\w+\.)?"?([a-z_][a-z0-9_]*)"#).unwrap();
    static ref FILTER_CLAUSE: Regex = Regex::new(r"(?i)\b(?:where|exists|having)\b").unwrap();
}

/// Rows plus where they came from
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub rows: ResultSet,
    pub origin: DataOrigin,
}

/// A place rows can come from. `Ok(None)` passes to the next source.
#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    fn origin(&self) -> DataOrigin;

    async fn fetch(&self, sql: &str) -> Result<Option<ResultSet>, AppError>;
}

/// An `email = '...'` predicate found in a statement. Any column whose name
/// ends in `email` counts, optionally qualified.
#[derive(Debug, Clone, PartialEq, Eq)]
struct EmailPredicate {
    matched: String,
    column: String,
    value: String,
}

impl EmailPredicate {
    fn find(sql: &str) -> Option<Self> {
        let caps = EMAIL_PREDICATE.captures(sql)?;
        Some(Self {
            matched: caps.get(0)?.as_str().to_string(),
            column: caps.get(1)?.as_str().to_string(),
            value: caps.get(2)?.as_str().to_string(),
        })
    }

    /// Column name without its table qualifier
    fn bare_column(&self) -> &str {
        self.column.rsplit('.').next().unwrap_or(&self.column)
    }

    /// Exact, then case-insensitive, then contains
    fn variants(&self, sql: &str) -> Vec<String> {
        vec![
            sql.to_string(),
            sql.replacen(
                &self.matched,
                &format!("LOWER({}) = LOWER('{}')", self.column, self.value),
                1,
            ),
            sql.replacen(&self.matched, &format!("{} ILIKE '%{}%'", self.column, self.value), 1),
        ]
    }
}

/// The live store, with progressively looser retries for email lookups
pub struct LiveSource {
    store: Arc<dyn LiveStore>,
}

impl LiveSource {
    pub fn new(store: Arc<dyn LiveStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl DataSource for LiveSource {
    fn origin(&self) -> DataOrigin {
        DataOrigin::Live
    }

    async fn fetch(&self, sql: &str) -> Result<Option<ResultSet>, AppError> {
        let email = EmailPredicate::find(sql);
        let attempts = match &email {
            Some(predicate) => predicate.variants(sql),
            None => vec![sql.to_string()],
        };

        for (i, attempt) in attempts.iter().enumerate() {
            let rows = match self.store.run(attempt).await {
                Ok(rows) => rows,
                Err(e) if i == 0 => return Err(e),
                Err(e) => {
                    tracing::warn!("Relaxed email attempt {} failed, giving up: {}", i + 1, e);
                    break;
                }
            };
            if !rows.is_empty() {
                if i > 0 {
                    tracing::info!("Email lookup matched on relaxed attempt {}: {}", i + 1, attempt);
                }
                return Ok(Some(rows));
            }
        }

        if email.is_some() || !FILTER_CLAUSE.is_match(sql) {
            tracing::warn!("Live store returned no rows for {}", sql);
            return Ok(None);
        }

        // A filtered statement with no matches is a real answer
        Ok(Some(Vec::new()))
    }
}

/// Fixed sample rows keyed by the first `FROM` table
pub struct MockSource;

#[async_trait::async_trait]
impl DataSource for MockSource {
    fn origin(&self) -> DataOrigin {
        DataOrigin::Mock
    }

    async fn fetch(&self, sql: &str) -> Result<Option<ResultSet>, AppError> {
        Ok(mock_result(sql))
    }
}

/// First `FROM <identifier>` in the statement
pub fn infer_table(sql: &str) -> Option<String> {
    FROM_TABLE
        .captures(sql)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}

fn mock_result(sql: &str) -> Option<ResultSet> {
    let table = infer_table(sql)?;
    let rows = fixtures::mock_rows(&table)?;

    if sql.to_lowercase().contains("count(") {
        let mut row = serde_json::Map::new();
        row.insert("count".to_string(), json!(rows.len()));
        return Some(vec![row]);
    }

    let Some(predicate) = EmailPredicate::find(sql) else {
        return Some(rows.clone());
    };
    let needle = predicate.value.to_lowercase();
    Some(
        rows.iter()
            .filter(|row| match row.get(predicate.bare_column()) {
                Some(Value::String(email)) => email.to_lowercase().contains(&needle),
                Some(_) => false,
                None => true,
            })
            .cloned()
            .collect(),
    )
}

pub struct QueryExecutor {
    sources: Vec<Box<dyn DataSource>>,
}

impl QueryExecutor {
    pub fn new(store: Option<Arc<dyn LiveStore>>) -> Self {
        let mut sources: Vec<Box<dyn DataSource>> = Vec::new();
        if let Some(store) = store {
            sources.push(Box::new(LiveSource::new(store)));
        }
        sources.push(Box::new(MockSource));
        Self { sources }
    }

    /// Validate, then try each source in order.
    ///
    /// Fails with `InvalidSql` for anything that is not a read-only SELECT, and
    /// with `Database` when the store failed and no mock table can be inferred.
    pub async fn execute(&self, query: &GeneratedQuery) -> Result<ExecutionOutcome, AppError> {
        let sql = SqlValidator::validate_select_only(&query.sql)?;

        let mut last_error = None;
        let mut live_was_empty = false;

        for source in &self.sources {
            match source.fetch(&sql).await {
                Ok(Some(rows)) => {
                    if source.origin() == DataOrigin::Mock {
                        tracing::warn!("Using mock data for query: {}", sql);
                    }
                    return Ok(ExecutionOutcome {
                        rows,
                        origin: source.origin(),
                    });
                }
                Ok(None) => live_was_empty |= source.origin() == DataOrigin::Live,
                Err(e) => {
                    if e.is_missing_relation() {
                        tracing::warn!("Referenced relation is missing: {}", e);
                    } else {
                        tracing::warn!("{:?} source failed: {}", source.origin(), e);
                    }
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(AppError::Database(msg)) => Err(AppError::Database(msg)),
            Some(e) => Err(AppError::Database(e.to_string())),
            None if live_was_empty => Ok(ExecutionOutcome {
                rows: Vec::new(),
                origin: DataOrigin::Live,
            }),
            None => Err(AppError::Connection(
                "No live store is configured and no sample data matches the query".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Column, Provenance};
    use crate::services::database::{SchemaSource, StatementRunner, TableInfo};
    use std::sync::Mutex;

    /// Replays scripted results in order and records each statement it saw
    struct ScriptedStore {
        replies: Mutex<Vec<Result<ResultSet, AppError>>>,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedStore {
        fn new(replies: Vec<Result<ResultSet, AppError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl StatementRunner for ScriptedStore {
        async fn run(&self, sql: &str) -> Result<ResultSet, AppError> {
            self.seen.lock().unwrap().push(sql.to_string());
            self.replies.lock().unwrap().pop().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    #[async_trait::async_trait]
    impl SchemaSource for ScriptedStore {
        async fn list_tables(&self) -> Result<Vec<TableInfo>, AppError> {
            Ok(Vec::new())
        }

        async fn list_columns(&self, _table: &str) -> Result<Vec<Column>, AppError> {
            Ok(Vec::new())
        }
    }

    fn query(sql: &str) -> GeneratedQuery {
        GeneratedQuery::new(sql, Provenance::RuleBased)
    }

    fn row(value: Value) -> crate::models::Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_missing_relation_substitutes_mock_rows() {
        let store = ScriptedStore::new(vec![Err(AppError::Database(
            "relation \"hospitals\" does not exist".to_string(),
        ))]);
        let executor = QueryExecutor::new(Some(store));
        let outcome = executor.execute(&query("SELECT * FROM hospitals")).await.unwrap();

        assert_eq!(outcome.origin, DataOrigin::Mock);
        assert_eq!(&outcome.rows, fixtures::mock_rows("hospitals").unwrap());
    }

    #[tokio::test]
    async fn test_live_rows_are_returned() {
        let live = vec![row(json!({ "id": 7, "name": "Live Clinic" }))];
        let store = ScriptedStore::new(vec![Ok(live.clone())]);
        let executor = QueryExecutor::new(Some(store.clone()));
        let outcome = executor.execute(&query("SELECT * FROM hospitals;")).await.unwrap();

        assert_eq!(outcome, ExecutionOutcome { rows: live, origin: DataOrigin::Live });
        assert_eq!(store.seen(), vec!["SELECT * FROM hospitals".to_string()]);
    }

    #[tokio::test]
    async fn test_rejects_non_select_before_store() {
        let store = ScriptedStore::new(vec![]);
        let executor = QueryExecutor::new(Some(store.clone()));

        for sql in ["DELETE FROM hospitals", "  drop table doctors", "UPDATE patients SET age = 1"] {
            let err = executor.execute(&query(sql)).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidSql(_)), "{}", sql);
        }
        let err = executor
            .execute(&GeneratedQuery::new("INSERT INTO hospitals VALUES (1)", Provenance::Model))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidSql(_)));
        assert!(store.seen().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_select_prefixed_writes() {
        let store = ScriptedStore::new(vec![]);
        let executor = QueryExecutor::new(Some(store.clone()));

        for sql in [
            "SELECT * INTO doctors_copy FROM doctors",
            "SELECT * FROM doctors FOR UPDATE",
            "SELECT 1 -- '\n; DROP TABLE doctors",
        ] {
            let err = executor
                .execute(&GeneratedQuery::new(sql, Provenance::Model))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::InvalidSql(_)), "{}", sql);
        }
        assert!(store.seen().is_empty());
    }

    #[tokio::test]
    async fn test_empty_unfiltered_result_uses_mock() {
        let store = ScriptedStore::new(vec![Ok(Vec::new())]);
        let executor = QueryExecutor::new(Some(store));
        let outcome = executor.execute(&query("SELECT * FROM doctors")).await.unwrap();

        assert_eq!(outcome.origin, DataOrigin::Mock);
        assert_eq!(outcome.rows.len(), 3);
    }

    #[tokio::test]
    async fn test_filtered_empty_result_stays_empty() {
        let store = ScriptedStore::new(vec![Ok(Vec::new())]);
        let executor = QueryExecutor::new(Some(store));
        let outcome = executor
            .execute(&query("SELECT * FROM patients WHERE age > 100"))
            .await
            .unwrap();

        assert_eq!(outcome.origin, DataOrigin::Live);
        assert!(outcome.rows.is_empty());
    }

    #[tokio::test]
    async fn test_count_substitution() {
        let store = ScriptedStore::new(vec![Err(AppError::Database("connection reset".to_string()))]);
        let executor = QueryExecutor::new(Some(store));
        let outcome = executor.execute(&query("SELECT COUNT(*) FROM patients")).await.unwrap();

        assert_eq!(outcome.rows, vec![row(json!({ "count": 6 }))]);
        assert_eq!(outcome.origin, DataOrigin::Mock);
    }

    #[tokio::test]
    async fn test_email_lookup_relaxes_matching() {
        let hit = vec![row(json!({ "id": 1, "email": "Smith@Hospital.com" }))];
        let store = ScriptedStore::new(vec![Ok(Vec::new()), Ok(hit.clone())]);
        let executor = QueryExecutor::new(Some(store.clone()));
        let outcome = executor
            .execute(&query("SELECT * FROM doctors WHERE email = 'smith@hospital.com'"))
            .await
            .unwrap();

        assert_eq!(outcome.rows, hit);
        assert_eq!(
            store.seen(),
            vec![
                "SELECT * FROM doctors WHERE email = 'smith@hospital.com'".to_string(),
                "SELECT * FROM doctors WHERE LOWER(email) = LOWER('smith@hospital.com')".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_email_lookup_falls_back_to_filtered_mock() {
        let store = ScriptedStore::new(vec![]);
        let executor = QueryExecutor::new(Some(store.clone()));
        let outcome = executor
            .execute(&query("SELECT * FROM doctors d WHERE d.email = 'SMITH'"))
            .await
            .unwrap();

        assert_eq!(store.seen().len(), 3);
        assert_eq!(store.seen()[2], "SELECT * FROM doctors d WHERE d.email ILIKE '%SMITH%'");
        assert_eq!(outcome.origin, DataOrigin::Mock);
        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.rows[0]["name"], "Dr. Smith");
    }

    #[tokio::test]
    async fn test_email_error_stops_retries() {
        let store = ScriptedStore::new(vec![Err(AppError::Database("timeout".to_string()))]);
        let executor = QueryExecutor::new(Some(store.clone()));
        executor
            .execute(&query("SELECT * FROM doctors WHERE email = 'x@y.z'"))
            .await
            .unwrap();

        assert_eq!(store.seen().len(), 1);
    }

    #[tokio::test]
    async fn test_prefixed_email_column_is_rewritten_whole() {
        let store = ScriptedStore::new(vec![]);
        let executor = QueryExecutor::new(Some(store.clone()));
        let outcome = executor
            .execute(&query("SELECT * FROM staff WHERE work_email = 'a@b.c'"))
            .await
            .unwrap();

        assert_eq!(
            store.seen(),
            vec![
                "SELECT * FROM staff WHERE work_email = 'a@b.c'".to_string(),
                "SELECT * FROM staff WHERE LOWER(work_email) = LOWER('a@b.c')".to_string(),
                "SELECT * FROM staff WHERE work_email ILIKE '%a@b.c%'".to_string(),
            ]
        );
        assert_eq!(outcome.origin, DataOrigin::Live);
        assert!(outcome.rows.is_empty());
    }

    #[tokio::test]
    async fn test_failed_relaxed_attempt_counts_as_no_match() {
        let store = ScriptedStore::new(vec![
            Ok(Vec::new()),
            Err(AppError::Database("function lower(integer) does not exist".to_string())),
        ]);
        let executor = QueryExecutor::new(Some(store.clone()));
        let outcome = executor
            .execute(&query("SELECT * FROM doctors WHERE email = 'johnson'"))
            .await
            .unwrap();

        assert_eq!(store.seen().len(), 2);
        assert_eq!(outcome.origin, DataOrigin::Mock);
        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.rows[0]["name"], "Dr. Johnson");
    }

    #[test]
    fn test_email_predicate_keeps_whole_column_name() {
        let predicate = EmailPredicate::find("SELECT * FROM staff s WHERE s.work_email = 'a@b.c'").unwrap();
        assert_eq!(predicate.column, "s.work_email");
        assert_eq!(predicate.bare_column(), "work_email");
        assert_eq!(predicate.value, "a@b.c");
        assert!(EmailPredicate::find("SELECT * FROM staff WHERE emails_sent = 3").is_none());
    }

    #[tokio::test]
    async fn test_unknown_table_error_is_surfaced() {
        let store = ScriptedStore::new(vec![Err(AppError::Database(
            "relation \"nurses\" does not exist".to_string(),
        ))]);
        let executor = QueryExecutor::new(Some(store));
        let err = executor.execute(&query("SELECT * FROM nurses")).await.unwrap_err();

        assert!(err.is_missing_relation());
    }

    #[tokio::test]
    async fn test_without_store_uses_mock_only() {
        let executor = QueryExecutor::new(None);
        let outcome = executor
            .execute(&query(
                "SELECT d.* FROM doctors d WHERE EXISTS (SELECT 1 FROM patients p WHERE p.doctor_id = d.id)",
            ))
            .await
            .unwrap();
        assert_eq!(outcome.origin, DataOrigin::Mock);
        assert_eq!(outcome.rows.len(), 3);

        let err = executor.execute(&query("SELECT 1")).await.unwrap_err();
        assert!(matches!(err, AppError::Connection(_)));
    }

    #[test]
    fn test_infer_table() {
        assert_eq!(infer_table("select * from Hospitals limit 10").as_deref(), Some("hospitals"));
        assert_eq!(infer_table("SELECT * FROM public.doctors").as_deref(), Some("doctors"));
        assert_eq!(infer_table("SELECT 1"), None);
    }
}
