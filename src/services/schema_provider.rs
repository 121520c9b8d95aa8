use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::api::middleware::AppError;
use crate::models::{Schema, SchemaOrigin, Table};
use crate::services::database::LiveStore;
use crate::services::fixtures;

#[derive(Debug, Clone)]
struct CachedSchema {
    schema: Schema,
    cached_at: Instant,
}

/// Resolves the current database structure. Never fails: any problem with the
/// live store yields the fixed fallback schema.
pub struct SchemaProvider {
    store: Option<Arc<dyn LiveStore>>,
    cache_ttl: Option<Duration>,
    cache: RwLock<Option<CachedSchema>>,
}

impl SchemaProvider {
    pub fn new(store: Option<Arc<dyn LiveStore>>, cache_ttl: Option<Duration>) -> Self {
        Self {
            store,
            cache_ttl,
            cache: RwLock::new(None),
        }
    }

    pub async fn get_schema(&self) -> Schema {
        if let Some(schema) = self.cached().await {
            tracing::debug!("Using cached schema ({} tables)", schema.tables.len());
            return schema;
        }

        let schema = match &self.store {
            None => {
                tracing::debug!("No live store configured, using fallback schema");
                fixtures::fallback_schema()
            }
            Some(store) => {
                Self::provision_helper(store.as_ref()).await;

                match Self::introspect(store.as_ref()).await {
                    Ok(tables) if !tables.is_empty() => {
                        tracing::info!("Found {} tables in database", tables.len());
                        Schema::new(tables, SchemaOrigin::Live)
                    }
                    Ok(_) => {
                        tracing::warn!("No tables found in database, using fallback schema");
                        fixtures::fallback_schema()
                    }
                    Err(e) => {
                        tracing::warn!("Error fetching schema, using fallback schema: {}", e);
                        fixtures::fallback_schema()
                    }
                }
            }
        };

        self.store_in_cache(&schema).await;
        schema
    }

    /// Drop any cached schema so the next call introspects again
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    async fn cached(&self) -> Option<Schema> {
        let ttl = self.cache_ttl?;
        let guard = self.cache.read().await;
        guard
            .as_ref()
            .filter(|entry| entry.cached_at.elapsed() < ttl)
            .map(|entry| entry.schema.clone())
    }

    async fn store_in_cache(&self, schema: &Schema) {
        if self.cache_ttl.is_none() {
            return;
        }
        *self.cache.write().await = Some(CachedSchema {
            schema: schema.clone(),
            cached_at: Instant::now(),
        });
    }

    async fn provision_helper(store: &dyn LiveStore) {
        if let Err(e) = store.ensure_helper().await {
            tracing::warn!("Could not provision query helper, executing statements directly: {}", e);
        }
    }

    async fn introspect(store: &dyn LiveStore) -> Result<Vec<Table>, AppError> {
        let mut tables = Vec::new();

        for info in store.list_tables().await? {
            let columns = store.list_columns(&info.name).await?;
            tables.push(Table {
                name: info.name,
                description: info.description,
                columns,
                sample_data: Vec::new(),
            });
        }

        Ok(tables)
    }
}
