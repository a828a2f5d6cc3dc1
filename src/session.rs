//! One user's working state: the loaded document, its pipeline, the chat
//! transcript and the generation settings. Both front ends (the REPL and
//! the HTTP API) drive the system through a [`ChatSession`].

use crate::config::{AppConfig, MODEL_OPTIONS};
use crate::database::{SmartVectorStore, StoreInfo, VectorDBError};
use crate::document::{Chunk, DocumentError, DocumentInfo, PdfProcessor};
use crate::llm::{ConversationMemory, PipelineInfo, RagPipeline};
use crate::providers::openrouter::ConnectionReport;
use crate::providers::{ChatProvider, EmbeddingProvider, LlmSettings, OpenAIEmbeddings, OpenRouterProvider};
use crate::utils::{FileCache, MetricsCollector, SessionMetrics};
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use validator::Validate;

pub const QUICK_QUESTIONS: [&str; 4] = [
    "What is this document about?",
    "Summarize the main content of the document",
    "What are the most important points?",
    "What is the conclusion of the document?",
];

pub const DEMO_QUESTIONS: [&str; 5] = [
    "What is this document about?",
    "What are the goals described in the document?",
    "Which technical requirements are mentioned?",
    "What needs to be done to complete the work?",
    "Summarize the most important points",
];

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No document loaded. Load a PDF first.")]
    NoDocument,
    #[error("File too large ({size_mb:.2} MB). Maximum size: {max_mb} MB")]
    FileTooLarge { size_mb: f64, max_mb: u64 },
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("Vector store error: {0}")]
    VectorStore(#[from] VectorDBError),
    #[error("Failed to initialize LLM: {0}")]
    Llm(String),
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
    #[error("Report error: {0}")]
    Report(String),
}

/// Steps of turning an uploaded PDF into a ready pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    InitProcessor,
    Chunking,
    Indexing,
    InitLlm,
    Pipeline,
    Done,
}

impl ProcessingStage {
    pub fn percent(&self) -> u8 {
        match self {
            Self::InitProcessor => 20,
            Self::Chunking => 40,
            Self::Indexing => 60,
            Self::InitLlm => 80,
            Self::Pipeline => 90,
            Self::Done => 100,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::InitProcessor => "🔄 Initializing processor...",
            Self::Chunking => "📖 Reading and chunking document...",
            Self::Indexing => "🔍 Building vector store...",
            Self::InitLlm => "🤖 Initializing LLM...",
            Self::Pipeline => "🔗 Creating RAG pipeline...",
            Self::Done => "✅ Done!",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Settings {
    #[validate(length(min = 1, max = 200))]
    pub model: String,
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,
    #[validate(range(min = 1, max = 32768))]
    pub max_tokens: u32,
    pub use_memory: bool,
    pub use_streaming: bool,
}

impl Settings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.default_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            use_memory: true,
            use_streaming: true,
        }
    }

    fn same_model_params(&self, other: &Settings) -> bool {
        self.model == other.model
            && self.temperature == other.temperature
            && self.max_tokens == other.max_tokens
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatExchange {
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub metrics: SessionMetrics,
    pub chat_history: Vec<ChatExchange>,
    pub document_info: Option<DocumentInfo>,
    pub pipeline_info: Option<PipelineInfo>,
    pub store_info: Option<StoreInfo>,
    pub settings: Settings,
}

/// Builds the chat model for a set of generation settings.
pub type ChatFactory = Arc<dyn Fn(LlmSettings) -> anyhow::Result<Box<dyn ChatProvider>> + Send + Sync>;

pub struct ChatSession {
    config: AppConfig,
    settings: Settings,
    embeddings: Arc<dyn EmbeddingProvider>,
    chat_factory: ChatFactory,
    metrics: Arc<MetricsCollector>,
    cache: Option<Arc<FileCache>>,
    pipeline: Option<Arc<RagPipeline>>,
    store_info: Option<StoreInfo>,
    document: Option<DocumentInfo>,
    chat_history: Vec<ChatExchange>,
}

impl ChatSession {
    /// Session backed by the hosted embedding and OpenRouter chat models.
    pub fn new(config: AppConfig) -> Self {
        let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(OpenAIEmbeddings::new(
            &config.embedding_api_key,
            &config.embedding_api_base,
            &config.embedding_model,
        ));
        let chat_factory: ChatFactory = Arc::new(|settings: LlmSettings| -> anyhow::Result<Box<dyn ChatProvider>> {
            let provider = OpenRouterProvider::new(settings)?;
            Ok(Box::new(provider) as Box<dyn ChatProvider>)
        });
        Self::with_providers(config, embeddings, chat_factory)
    }

    pub fn with_providers(
        config: AppConfig,
        embeddings: Arc<dyn EmbeddingProvider>,
        chat_factory: ChatFactory,
    ) -> Self {
        let metrics = Arc::new(MetricsCollector::new(&config.metrics_file));
        let cache = config
            .enable_cache
            .then(|| Arc::new(FileCache::new(&config.cache_dir, config.cache_ttl)));

        Self {
            settings: Settings::from_config(&config),
            config,
            embeddings,
            chat_factory,
            metrics,
            cache,
            pipeline: None,
            store_info: None,
            document: None,
            chat_history: Vec::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn document(&self) -> Option<&DocumentInfo> {
        self.document.as_ref()
    }

    pub fn has_document(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn chat_history(&self) -> &[ChatExchange] {
        &self.chat_history
    }

    pub fn metrics(&self) -> SessionMetrics {
        self.metrics.snapshot()
    }

    pub fn store_info(&self) -> Option<&StoreInfo> {
        self.store_info.as_ref()
    }

    pub fn pipeline_info(&self) -> Option<PipelineInfo> {
        self.pipeline.as_ref().map(|pipeline| pipeline.pipeline_info())
    }

    pub fn llm_settings(&self) -> LlmSettings {
        LlmSettings {
            api_key: self.config.openrouter_api_key.clone(),
            api_base: self.config.api_base.clone(),
            model: self.settings.model.clone(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        }
    }

    fn build_llm(&self) -> Result<Box<dyn ChatProvider>, SessionError> {
        (self.chat_factory)(self.llm_settings()).map_err(|e| SessionError::Llm(e.to_string()))
    }

    fn check_upload(&self, path: &Path, display_name: &str) -> Result<(), SessionError> {
        let extension = Path::new(display_name)
            .extension()
            .or_else(|| path.extension())
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !self.config.supported_formats.iter().any(|format| *format == extension) {
            return Err(SessionError::UnsupportedFormat(display_name.to_string()));
        }

        let size = std::fs::metadata(path)
            .map_err(|source| DocumentError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        if size > self.config.max_file_size {
            return Err(SessionError::FileTooLarge {
                size_mb: size as f64 / (1024.0 * 1024.0),
                max_mb: self.config.max_file_size_mb(),
            });
        }
        Ok(())
    }

    /// Loads a PDF and replaces the current pipeline with one over it.
    /// `display_name` is the name the user knows the file by, which differs
    /// from `path` for uploads stored in temporary files.
    pub async fn process_document<F>(
        &mut self,
        path: &Path,
        display_name: &str,
        mut progress: F,
    ) -> Result<DocumentInfo, SessionError>
    where
        F: FnMut(ProcessingStage),
    {
        self.check_upload(path, display_name)?;

        progress(ProcessingStage::InitProcessor);
        let processor = PdfProcessor::new(
            &self.config,
            self.embeddings.clone(),
            self.cache.clone(),
            self.metrics.clone(),
        );

        progress(ProcessingStage::Chunking);
        let chunks = processor.load_and_chunk(path).await?;
        let mut info = PdfProcessor::document_info(path, &chunks)?;
        info.filename = display_name.to_string();

        self.index_chunks(chunks, info, &mut progress).await
    }

    /// Indexes already chunked text and builds the pipeline over it.
    pub async fn index_chunks<F>(
        &mut self,
        chunks: Vec<Chunk>,
        info: DocumentInfo,
        progress: &mut F,
    ) -> Result<DocumentInfo, SessionError>
    where
        F: FnMut(ProcessingStage),
    {
        progress(ProcessingStage::Indexing);
        let mut store = SmartVectorStore::new(&self.config, self.embeddings.clone());
        let retriever = store.build_store(chunks).await?;

        progress(ProcessingStage::InitLlm);
        let llm = self.build_llm()?;

        progress(ProcessingStage::Pipeline);
        let memory = ConversationMemory::new(self.config.memory_size, self.config.context_exchanges);
        self.pipeline = Some(Arc::new(RagPipeline::new(retriever, llm, memory, self.metrics.clone())));
        self.store_info = Some(store.store_info());
        self.document = Some(info.clone());

        progress(ProcessingStage::Done);
        crate::success!("Document {} ready ({} chunks)", info.filename, info.chunks);
        Ok(info)
    }

    fn pipeline(&self) -> Result<Arc<RagPipeline>, SessionError> {
        self.pipeline.clone().ok_or(SessionError::NoDocument)
    }

    /// Answers without streaming and records the exchange.
    pub async fn ask(&mut self, question: &str) -> Result<String, SessionError> {
        let pipeline = self.pipeline()?;
        let answer = pipeline.ask(question, self.settings.use_memory).await;
        self.record_exchange(question, &answer);
        Ok(answer)
    }

    /// Token stream for `question`. The caller records the exchange once it
    /// has the full answer.
    pub fn ask_stream(&self, question: &str) -> Result<BoxStream<'static, String>, SessionError> {
        let pipeline = self.pipeline()?;
        Ok(pipeline.ask_streaming(question, self.settings.use_memory))
    }

    pub fn record_exchange(&mut self, question: &str, answer: &str) {
        self.chat_history.push(ChatExchange {
            question: question.to_string(),
            answer: answer.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn clear_history(&mut self) {
        self.chat_history.clear();
        if let Some(pipeline) = &self.pipeline {
            pipeline.clear_memory();
        }
    }

    /// Applies new settings. A changed model, temperature or token limit
    /// swaps the chat model of the current pipeline.
    pub fn update_settings(&mut self, settings: Settings) -> Result<(), SessionError> {
        settings
            .validate()
            .map_err(|e| SessionError::InvalidSettings(e.to_string()))?;
        if !MODEL_OPTIONS.contains(&settings.model.as_str()) {
            warn!("Model {} is not in the suggested list", settings.model);
        }

        let previous = std::mem::replace(&mut self.settings, settings);
        if self.settings.same_model_params(&previous) {
            return Ok(());
        }

        if let Some(pipeline) = &self.pipeline {
            match self.build_llm() {
                Ok(llm) => pipeline.set_llm(llm),
                Err(e) => {
                    self.settings = previous;
                    return Err(e);
                }
            }
        }
        info!(
            "Settings updated: model={}, temperature={}, max_tokens={}",
            self.settings.model, self.settings.temperature, self.settings.max_tokens
        );
        Ok(())
    }

    pub async fn test_connection(&self) -> Result<ConnectionReport, SessionError> {
        let provider = OpenRouterProvider::new(self.llm_settings()).map_err(|e| SessionError::Llm(e.to_string()))?;
        Ok(provider.test_connection().await)
    }

    pub fn clear_cache(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.clear())
    }

    pub fn report(&self) -> Report {
        Report {
            generated_at: Utc::now(),
            metrics: self.metrics.snapshot(),
            chat_history: self.chat_history.clone(),
            document_info: self.document.clone(),
            pipeline_info: self.pipeline_info(),
            store_info: self.store_info.clone(),
            settings: self.settings.clone(),
        }
    }

    pub fn write_report(&self, path: &Path) -> Result<PathBuf, SessionError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SessionError::Report(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(&self.report()).map_err(|e| SessionError::Report(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| SessionError::Report(e.to_string()))?;
        info!("Report written to {}", path.display());
        Ok(path.to_path_buf())
    }

    /// Writes `rag_report_{unix time}.json` into `dir`.
    pub fn export_report(&self, dir: &Path) -> Result<PathBuf, SessionError> {
        self.write_report(&dir.join(format!("rag_report_{}.json", Utc::now().timestamp())))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::document::chunker::tests::KeywordEmbeddings;
    use crate::llm::rag::tests::{sample_chunks, ScriptedChat};
    use futures::StreamExt;

    pub(crate) fn scripted_session(root: &Path, reply: &[&str]) -> ChatSession {
        let chat = ScriptedChat::replying(reply);
        let factory: ChatFactory = Arc::new(move |_settings: LlmSettings| -> anyhow::Result<Box<dyn ChatProvider>> {
            Ok(Box::new(chat.clone()))
        });
        ChatSession::with_providers(test_config(root), Arc::new(KeywordEmbeddings), factory)
    }

    pub(crate) fn sample_info() -> DocumentInfo {
        DocumentInfo {
            filename: "manual.pdf".to_string(),
            size_bytes: 2048,
            size_mb: 0.0,
            modified: "2026-01-01T00:00:00+00:00".to_string(),
            chunks: 1,
            language: Some("eng".to_string()),
        }
    }

    pub(crate) async fn loaded_session(root: &Path, reply: &[&str]) -> ChatSession {
        let mut session = scripted_session(root, reply);
        session
            .index_chunks(sample_chunks(), sample_info(), &mut |_| {})
            .await
            .unwrap();
        session
    }

    #[tokio::test]
    async fn asking_without_a_document_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = scripted_session(dir.path(), &["hi"]);
        assert!(matches!(session.ask("hello?").await, Err(SessionError::NoDocument)));
        assert!(session.ask_stream("hello?").is_err());
    }

    #[tokio::test]
    async fn indexing_reports_every_stage_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = scripted_session(dir.path(), &["hi"]);
        let mut seen = Vec::new();
        session
            .index_chunks(sample_chunks(), sample_info(), &mut |stage: ProcessingStage| seen.push(stage.percent()))
            .await
            .unwrap();

        assert_eq!(seen, vec![60, 80, 90, 100]);
        assert!(session.has_document());
        assert_eq!(session.store_info().unwrap().store_type, "memory");
        assert_eq!(session.document().unwrap().filename, "manual.pdf");
    }

    #[tokio::test]
    async fn ask_records_exchange() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = loaded_session(dir.path(), &["Two years."]).await;

        assert_eq!(session.ask("Warranty?").await.unwrap(), "Two years.");
        assert_eq!(session.chat_history().len(), 1);
        assert_eq!(session.metrics().questions_asked, 1);
        assert_eq!(session.pipeline_info().unwrap().memory_size, 1);

        session.clear_history();
        assert!(session.chat_history().is_empty());
        assert_eq!(session.pipeline_info().unwrap().memory_size, 0);
    }

    #[tokio::test]
    async fn streamed_answers_are_recorded_by_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = loaded_session(dir.path(), &["Two ", "years."]).await;

        let answer: String = session.ask_stream("Warranty?").unwrap().collect::<Vec<_>>().await.concat();
        session.record_exchange("Warranty?", &answer);
        assert_eq!(session.chat_history()[0].answer, "Two years.");
    }

    #[tokio::test]
    async fn wrong_extension_and_oversized_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = scripted_session(dir.path(), &["hi"]);

        let text = dir.path().join("notes.txt");
        std::fs::write(&text, b"plain").unwrap();
        let result = session.process_document(&text, "notes.txt", |_| {}).await;
        assert!(matches!(result, Err(SessionError::UnsupportedFormat(_))));

        let big = dir.path().join("big.pdf");
        std::fs::write(&big, vec![0u8; 2048]).unwrap();
        session.config.max_file_size = 1024;
        let result = session.process_document(&big, "big.pdf", |_| {}).await;
        assert!(matches!(result, Err(SessionError::FileTooLarge { .. })));
    }

    #[tokio::test]
    async fn settings_are_validated() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = loaded_session(dir.path(), &["ok"]).await;

        let mut settings = session.settings().clone();
        settings.temperature = 3.5;
        assert!(matches!(
            session.update_settings(settings),
            Err(SessionError::InvalidSettings(_))
        ));
        assert_eq!(session.settings().temperature, 0.7);

        let mut settings = session.settings().clone();
        settings.model = MODEL_OPTIONS[2].to_string();
        settings.use_streaming = false;
        session.update_settings(settings).unwrap();
        assert_eq!(session.settings().model, MODEL_OPTIONS[2]);
        assert!(!session.settings().use_streaming);
    }

    #[tokio::test]
    async fn report_is_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = loaded_session(dir.path(), &["Two years."]).await;
        session.ask("Warranty?").await.unwrap();

        let path = session.export_report(&dir.path().join("reports")).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("rag_report_") && name.ends_with(".json"));

        let report: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(report["metrics"]["questions_asked"], 1);
        assert_eq!(report["chat_history"][0]["answer"], "Two years.");
        assert_eq!(report["document_info"]["filename"], "manual.pdf");
        assert_eq!(report["pipeline_info"]["retriever_type"], "memory");
        assert_eq!(report["store_info"]["type"], "memory");
    }
}
