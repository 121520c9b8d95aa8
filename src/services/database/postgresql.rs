// PostgreSQL store using connection pooling
use deadpool_postgres::{Config as PoolConfig, ManagerConfig, Pool, RecyclingMethod, Runtime};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_postgres::NoTls;
use url::Url;

use crate::api::middleware::AppError;
use crate::models::{Column, ResultSet, Row};
use crate::services::database::adapter::{SchemaSource, StatementRunner, TableInfo};

/// Server-side routine that wraps any SELECT into a JSON array of row objects
const HELPER_DEFINITION: &str = r#"
CREATE OR REPLACE FUNCTION run_sql_query(query text)
RETURNS json
LANGUAGE plpgsql
SET search_path = public
AS $$
DECLARE
  result json;
BEGIN
  EXECUTE format('SELECT COALESCE(json_agg(t), ''[]''::json) FROM (%s) t', query) INTO result;
  RETURN result;
EXCEPTION WHEN OTHERS THEN
  RAISE EXCEPTION 'SQL Error: %', SQLERRM;
END;
$$;
"#;

const LIST_TABLES_SQL: &str = r#"
SELECT
    table_name::text AS name,
    obj_description(format('%I.%I', table_schema, table_name)::regclass, 'pg_class') AS description
FROM information_schema.tables
WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
ORDER BY table_name
"#;

pub struct PostgresStore {
    pool: Pool,
    timeout: Duration,
    helper_ready: AtomicBool,
}

impl PostgresStore {
    /// Build a pooled store. No connection is opened until the first statement.
    pub fn connect(connection_url: &str, max_pool_size: usize, timeout: Duration) -> Result<Self, AppError> {
        // Validate PostgreSQL URL format
        let url = Url::parse(connection_url)
            .map_err(|e| AppError::Validation(format!("Invalid PostgreSQL URL: {}", e)))?;

        if url.scheme() != "postgresql" && url.scheme() != "postgres" {
            return Err(AppError::Validation(
                "URL must use postgresql:// or postgres:// scheme".to_string(),
            ));
        }

        let mut cfg = PoolConfig::new();
        cfg.url = Some(connection_url.to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| AppError::Connection(format!("Failed to create connection pool: {}", e)))?;
        pool.resize(max_pool_size);

        tracing::info!(
            "Created connection pool for {} (max_size: {})",
            mask_credentials(connection_url),
            max_pool_size
        );

        Ok(Self {
            pool,
            timeout,
            helper_ready: AtomicBool::new(false),
        })
    }

    async fn client(&self) -> Result<deadpool_postgres::Object, AppError> {
        tokio::time::timeout(self.timeout, self.pool.get())
            .await
            .map_err(|_| AppError::Connection(format!("Timed out after {:?} waiting for a connection", self.timeout)))?
            .map_err(|e| AppError::Connection(format!("Failed to get connection from pool: {}", e)))
    }

    async fn run_through_helper(&self, client: &tokio_postgres::Client, sql: &str) -> Result<ResultSet, AppError> {
        let row = tokio::time::timeout(
            self.timeout,
            client.query_one("SELECT run_sql_query($1)::text", &[&sql]),
        )
        .await
        .map_err(|_| AppError::Database(format!("Query timeout after {:?}", self.timeout)))??;

        let payload: Option<String> = row.try_get(0)?;
        match payload {
            Some(text) => serde_json::from_str::<ResultSet>(&text)
                .map_err(|e| AppError::Database(format!("Malformed result payload: {}", e))),
            None => Ok(Vec::new()),
        }
    }

    async fn run_direct(&self, client: &tokio_postgres::Client, sql: &str) -> Result<ResultSet, AppError> {
        let rows = tokio::time::timeout(self.timeout, client.query(&json_rows_statement(sql), &[]))
            .await
            .map_err(|_| AppError::Database(format!("Query timeout after {:?}", self.timeout)))??;

        rows.iter()
            .filter_map(|row| row.try_get::<_, Option<String>>(0).transpose())
            .map(|text| parse_json_row(&text?))
            .collect()
    }
}

#[async_trait::async_trait]
impl StatementRunner for PostgresStore {
    async fn run(&self, sql: &str) -> Result<ResultSet, AppError> {
        let client = self.client().await?;
        let statement = sql.trim().trim_end_matches(';');

        if self.helper_ready.load(Ordering::Acquire) {
            self.run_through_helper(&client, statement).await
        } else {
            self.run_direct(&client, statement).await
        }
    }

    async fn ensure_helper(&self) -> Result<(), AppError> {
        if self.helper_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let client = self.client().await?;
        tokio::time::timeout(self.timeout, client.batch_execute(HELPER_DEFINITION))
            .await
            .map_err(|_| AppError::Database("Timed out creating run_sql_query".to_string()))??;

        self.helper_ready.store(true, Ordering::Release);
        tracing::info!("Provisioned run_sql_query helper");
        Ok(())
    }
}

#[async_trait::async_trait]
impl SchemaSource for PostgresStore {
    async fn list_tables(&self) -> Result<Vec<TableInfo>, AppError> {
        let rows = self.run(LIST_TABLES_SQL).await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let name = row.get("name")?.as_str()?.to_string();
                let description = text_field(row, "description");
                Some(TableInfo { name, description })
            })
            .collect())
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<Column>, AppError> {
        let sql = format!(
            r#"
SELECT
    column_name::text AS name,
    data_type::text AS type,
    col_description(format('%I.%I', table_schema, table_name)::regclass, ordinal_position::int) AS description
FROM information_schema.columns
WHERE table_schema = 'public' AND table_name = {}
ORDER BY ordinal_position
"#,
            quote_literal(table)
        );
        let rows = self.run(&sql).await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(Column {
                    name: row.get("name")?.as_str()?.to_string(),
                    data_type: text_field(row, "type").unwrap_or_else(|| "unknown".to_string()),
                    description: text_field(row, "description"),
                })
            })
            .collect())
    }
}

fn text_field(row: &Row, key: &str) -> Option<String> {
    row.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Quote a value as a SQL string literal
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Wrap a statement so each result row comes back as one JSON text value.
/// The server does the type conversion, so numeric, uuid and json columns
/// keep their values.
fn json_rows_statement(sql: &str) -> String {
    format!("SELECT row_to_json(t)::text FROM ({}) t", sql)
}

fn parse_json_row(text: &str) -> Result<Row, AppError> {
    serde_json::from_str::<Row>(text).map_err(|e| AppError::Database(format!("Malformed result row: {}", e)))
}

/// Mask credentials in connection URL for safe logging
pub fn mask_credentials(url: &str) -> String {
    if let Ok(parsed_url) = Url::parse(url) {
        let mut masked = parsed_url.clone();
        if parsed_url.password().is_some() {
            let _ = masked.set_password(Some("***"));
        }
        masked.to_string()
    } else {
        "[invalid-url]".to_string()
    }
}
