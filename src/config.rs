use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub schema: SchemaConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL. Absent means every stage runs on fallback data.
    pub url: Option<String>,
    pub query_timeout_secs: u64,
    pub max_pool_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub gateway_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaConfig {
    /// Seconds a resolved schema may be reused. 0 disables the cache.
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub style: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env before reading the process environment
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder()
            .set_default("database.query_timeout_secs", 5)?
            .set_default("database.max_pool_size", 8)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("llm.gateway_url", "http://localhost:8080/v1/generate")?
            .set_default("llm.model", "gemini-1.5-flash")?
            .set_default("llm.timeout_secs", 8)?
            .set_default("schema.cache_ttl_secs", 60)?
            .set_default("logging.level", "info")?
            .set_default("logging.style", "auto")?;

        if let Some(database_url) = non_empty_var("DATABASE_URL") {
            builder = builder.set_override("database.url", database_url)?;
        }

        if let Some(timeout) = non_empty_var("QUERY_TIMEOUT_SECS") {
            builder = builder.set_override(
                "database.query_timeout_secs",
                timeout.parse::<u64>().unwrap_or(5),
            )?;
        }

        if let Some(host) = non_empty_var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }

        if let Some(port) = non_empty_var("PORT") {
            builder = builder.set_override("server.port", port.parse::<u16>().unwrap_or(3000))?;
        }

        if let Some(gateway_url) = non_empty_var("LLM_GATEWAY_URL") {
            builder = builder.set_override("llm.gateway_url", gateway_url)?;
        }

        if let Some(api_key) = non_empty_var("LLM_API_KEY") {
            builder = builder.set_override("llm.api_key", api_key)?;
        }

        if let Some(model) = non_empty_var("LLM_MODEL") {
            builder = builder.set_override("llm.model", model)?;
        }

        if let Some(timeout) = non_empty_var("LLM_TIMEOUT_SECS") {
            builder =
                builder.set_override("llm.timeout_secs", timeout.parse::<u64>().unwrap_or(8))?;
        }

        if let Some(ttl) = non_empty_var("SCHEMA_CACHE_TTL_SECS") {
            builder =
                builder.set_override("schema.cache_ttl_secs", ttl.parse::<u64>().unwrap_or(60))?;
        }

        if let Some(log_level) = non_empty_var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        if let Some(log_style) = non_empty_var("RUST_LOG_STYLE") {
            builder = builder.set_override("logging.style", log_style)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// The model path is enabled only when a credential is present.
    pub fn llm_enabled(&self) -> bool {
        self.llm.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.database.query_timeout_secs)
    }

    pub fn schema_cache_ttl(&self) -> Option<Duration> {
        match self.schema.cache_ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
