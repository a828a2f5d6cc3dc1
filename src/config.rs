use serde::Serialize;
use std::env;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Models offered by the front ends. Any OpenRouter model id is accepted.
pub const MODEL_OPTIONS: [&str; 4] = [
    "mistralai/mistral-7b-instruct",
    "meta-llama/llama-2-7b-chat",
    "google/gemma-7b-it",
    "microsoft/DialoGPT-medium",
];

const SECRET_SECTIONS: [&str; 6] = ["api", "app", "llm", "vectorstore", "cache", "logging"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("OPENROUTER_API_KEY is required in the environment, .env file or secrets file")]
    MissingApiKey,
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
    #[error("Failed to read secrets file {path}: {message}")]
    Secrets { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreType {
    /// Qdrant first, in-memory index when Qdrant is unreachable.
    Smart,
    Qdrant,
    Memory,
}

impl FromStr for VectorStoreType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "smart" => Ok(Self::Smart),
            "qdrant" => Ok(Self::Qdrant),
            "memory" | "faiss" => Ok(Self::Memory),
            other => Err(format!("unknown vector store type '{}'", other)),
        }
    }
}

/// Key/value pairs read from a TOML secrets file, either at top level
/// or nested in one of the well-known sections.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    table: toml::Table,
}

impl Secrets {
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        Ok(Self {
            table: content.parse::<toml::Table>()?,
        })
    }

    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Secrets {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml(&content)
            .map(Some)
            .map_err(|e| ConfigError::Secrets {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.table.get(key).and_then(value_to_string) {
            return Some(value);
        }
        SECRET_SECTIONS.iter().find_map(|section| {
            self.table
                .get(*section)
                .and_then(|s| s.as_table())
                .and_then(|s| s.get(key))
                .and_then(value_to_string)
        })
    }
}

fn value_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    // LLM
    #[serde(skip_serializing)]
    pub openrouter_api_key: String,
    pub api_base: String,
    pub default_model: String,
    pub temperature: f32,
    pub max_tokens: u32,

    // Embeddings
    pub embedding_model: String,
    pub embedding_api_base: String,
    #[serde(skip_serializing)]
    pub embedding_api_key: String,

    // Chunking
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_size: usize,
    pub breakpoint_threshold: u8,

    // Vector store and retrieval
    pub vector_store_type: VectorStoreType,
    pub collection_name: String,
    pub qdrant_url: String,
    pub retrieval_k: usize,
    pub fetch_k: usize,
    pub mmr_lambda: f32,

    // Conversation memory
    pub memory_size: usize,
    pub context_exchanges: usize,

    // App
    pub app_title: String,
    pub app_description: String,
    pub max_file_size: u64,
    pub supported_formats: Vec<String>,
    pub report_dir: PathBuf,

    // Cache
    pub enable_cache: bool,
    pub cache_ttl: Duration,
    pub cache_dir: PathBuf,

    // Logging and metrics
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub log_max_bytes: u64,
    pub log_backups: usize,
    pub metrics_file: PathBuf,
}

impl AppConfig {
    /// Loads `.env`, then reads the process environment with the secrets
    /// file (`SECRETS_FILE`, default `.streamlit/secrets.toml`) as fallback.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let secrets_path = env::var("SECRETS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".streamlit/secrets.toml"));
        let secrets = Secrets::load(&secrets_path)?;

        Self::from_sources(|key| env::var(key).ok(), secrets.as_ref())
    }

    pub fn from_sources<F>(lookup: F, secrets: Option<&Secrets>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = Source { lookup, secrets };

        let openrouter_api_key = source.string("OPENROUTER_API_KEY", "");
        if openrouter_api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }

        let api_base = source.string("OPENROUTER_API_BASE", "https://openrouter.ai/api/v1");
        validate_url("OPENROUTER_API_BASE", &api_base)?;
        let embedding_api_base = source.string("EMBEDDING_API_BASE", &api_base);
        validate_url("EMBEDDING_API_BASE", &embedding_api_base)?;
        let embedding_api_key = source.string("EMBEDDING_API_KEY", &openrouter_api_key);

        let temperature: f32 = source.parse("TEMPERATURE", 0.7)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(invalid("TEMPERATURE", temperature, "must be between 0.0 and 2.0"));
        }

        let chunk_size: usize = source.parse("CHUNK_SIZE", 1000)?;
        let chunk_overlap: usize = source.parse("CHUNK_OVERLAP", 200)?;
        if chunk_size == 0 {
            return Err(invalid("CHUNK_SIZE", chunk_size, "must be positive"));
        }
        if chunk_overlap >= chunk_size {
            return Err(invalid("CHUNK_OVERLAP", chunk_overlap, "must be smaller than CHUNK_SIZE"));
        }

        let breakpoint_threshold: u8 = source.parse("BREAKPOINT_THRESHOLD", 95)?;
        if !(1..=100).contains(&breakpoint_threshold) {
            return Err(invalid("BREAKPOINT_THRESHOLD", breakpoint_threshold, "must be a percentile in 1..=100"));
        }

        let mmr_lambda: f32 = source.parse("MMR_LAMBDA", 0.5)?;
        if !(0.0..=1.0).contains(&mmr_lambda) {
            return Err(invalid("MMR_LAMBDA", mmr_lambda, "must be between 0.0 and 1.0"));
        }

        let retrieval_k: usize = source.parse("RETRIEVAL_K", 5)?;
        let fetch_k: usize = source.parse("FETCH_K", 20)?;
        if retrieval_k == 0 {
            return Err(invalid("RETRIEVAL_K", retrieval_k, "must be positive"));
        }

        let memory_size: usize = source.parse("MEMORY_SIZE", 5)?;
        if memory_size == 0 {
            return Err(invalid("MEMORY_SIZE", memory_size, "must be positive"));
        }

        let max_file_size: u64 = source.parse("MAX_FILE_SIZE", 52_428_800)?;
        if max_file_size == 0 {
            return Err(invalid("MAX_FILE_SIZE", max_file_size, "must be positive"));
        }

        let log_file = source.string("LOG_FILE", "logs/app.log");

        Ok(Self {
            openrouter_api_key,
            api_base,
            default_model: source.string("DEFAULT_MODEL", MODEL_OPTIONS[0]),
            temperature,
            max_tokens: source.parse("MAX_TOKENS", 1024)?,
            embedding_model: source.string("EMBEDDING_MODEL", "openai/text-embedding-3-small"),
            embedding_api_base,
            embedding_api_key,
            chunk_size,
            chunk_overlap,
            min_chunk_size: source.parse("MIN_CHUNK_SIZE", 500)?,
            breakpoint_threshold,
            vector_store_type: source.parse("VECTOR_STORE_TYPE", VectorStoreType::Smart)?,
            collection_name: source.string("COLLECTION_NAME", "rag_documents"),
            qdrant_url: source.string("QDRANT_URL", "http://localhost:6334"),
            retrieval_k,
            fetch_k: fetch_k.max(retrieval_k),
            mmr_lambda,
            memory_size,
            context_exchanges: source.parse("CONTEXT_EXCHANGES", 3)?,
            app_title: source.string("APP_TITLE", "📚 RAG Chatbot Pro"),
            app_description: source.string(
                "APP_DESCRIPTION",
                "Ask questions about your PDF documents in any language",
            ),
            max_file_size,
            supported_formats: vec!["pdf".to_string()],
            report_dir: PathBuf::from(source.string("REPORT_DIR", "reports")),
            enable_cache: source.flag("ENABLE_CACHE", true),
            cache_ttl: Duration::from_secs(source.parse("CACHE_TTL", 3600)?),
            cache_dir: PathBuf::from(source.string("CACHE_DIR", "cache")),
            log_level: source.string("LOG_LEVEL", "INFO"),
            log_file: (!log_file.trim().is_empty()).then(|| PathBuf::from(log_file)),
            log_max_bytes: source.parse("LOG_MAX_BYTES", 10 * 1024 * 1024)?,
            log_backups: source.parse("LOG_BACKUPS", 3)?,
            metrics_file: PathBuf::from(source.string("METRICS_FILE", "logs/metrics.json")),
        })
    }

    pub fn max_file_size_mb(&self) -> u64 {
        self.max_file_size / (1024 * 1024)
    }
}

struct Source<'a, F> {
    lookup: F,
    secrets: Option<&'a Secrets>,
}

impl<'a, F> Source<'a, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .filter(|v| !v.is_empty())
            .or_else(|| self.secrets.and_then(|s| s.get(key)))
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.raw(key)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(default)
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.raw(key) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|e: T::Err| invalid(key, &value, e)),
            None => Ok(default),
        }
    }
}

fn invalid(key: &str, value: impl Display, reason: impl Display) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_url(key: &str, value: &str) -> Result<(), ConfigError> {
    Url::parse(value).map(|_| ()).map_err(|e| invalid(key, value, e))
}

#[cfg(test)]
pub(crate) fn test_config(root: &Path) -> AppConfig {
    let root = root.to_path_buf();
    AppConfig::from_sources(
        move |key| match key {
            "OPENROUTER_API_KEY" => Some("test-key".to_string()),
            "VECTOR_STORE_TYPE" => Some("memory".to_string()),
            "CACHE_DIR" => Some(root.join("cache").display().to_string()),
            "METRICS_FILE" => Some(root.join("metrics.json").display().to_string()),
            "REPORT_DIR" => Some(root.join("reports").display().to_string()),
            "LOG_FILE" => Some(root.join("app.log").display().to_string()),
            _ => None,
        },
        None,
    )
    .expect("test config")
}
