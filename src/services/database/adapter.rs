// Store collaborator traits used by the schema provider and query executor
use crate::api::middleware::AppError;
use crate::models::{Column, ResultSet};

/// A base table as reported by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub description: Option<String>,
}

/// Executes ad-hoc statements against the live store
#[async_trait::async_trait]
pub trait StatementRunner: Send + Sync {
    /// Run one statement and return its rows as JSON objects
    async fn run(&self, sql: &str) -> Result<ResultSet, AppError>;

    /// Provision any server-side routine `run` relies on. Must be idempotent.
    async fn ensure_helper(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Enumerates the store's structure
#[async_trait::async_trait]
pub trait SchemaSource: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<TableInfo>, AppError>;

    async fn list_columns(&self, table: &str) -> Result<Vec<Column>, AppError>;
}

/// A store that can both introspect and execute
pub trait LiveStore: StatementRunner + SchemaSource {}

impl<T: StatementRunner + SchemaSource> LiveStore for T {}
