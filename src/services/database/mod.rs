// Live store access
pub mod adapter;
pub mod postgresql;

pub use adapter::{LiveStore, SchemaSource, StatementRunner, TableInfo};
pub use postgresql::PostgresStore;

use std::sync::Arc;

use crate::config::Config;

/// Build the process-wide store client, or `None` when no usable URL is configured
pub fn connect_from_config(config: &Config) -> Option<Arc<dyn LiveStore>> {
    let url = config.database.url.as_deref()?;

    match PostgresStore::connect(url, config.database.max_pool_size, config.query_timeout()) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            tracing::warn!(
                "Live store unavailable ({}): {}. Falling back to sample schema and data.",
                postgresql::mask_credentials(url),
                e
            );
            None
        }
    }
}
