pub mod database; // Live store adapter (PostgreSQL)
pub mod fixtures;
pub mod llm_service;
pub mod pipeline;
pub mod prompt;
pub mod query_executor;
pub mod schema_provider;
pub mod sql_generator;
pub mod summarizer;
pub mod table_extractor;

pub use llm_service::*;
pub use pipeline::*;
pub use query_executor::*;
pub use schema_provider::*;
pub use sql_generator::SqlGenerator;
pub use summarizer::*;
