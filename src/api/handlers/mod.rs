pub mod llm;
pub mod query;
pub mod schema;

use std::sync::Arc;

use crate::config::Config;
use crate::services::{QueryPipeline, SchemaProvider, TextGenerator};

/// Shared handler state. Every client is created once at start-up.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<QueryPipeline>,
    pub schema_provider: Arc<SchemaProvider>,
    pub llm: Arc<dyn TextGenerator>,
    pub config: Config,
}
