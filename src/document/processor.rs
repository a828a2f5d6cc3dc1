use crate::config::AppConfig;
use crate::document::chunker::{Chunk, Chunker, RecursiveSplitter, SemanticChunker};
use crate::document::loader::{load_pdf, DocumentError, Page};
use crate::providers::traits::EmbeddingProvider;
use crate::utils::cache::{hash_hex, FileCache};
use crate::utils::metrics::MetricsCollector;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub filename: String,
    pub size_bytes: u64,
    pub size_mb: f64,
    pub modified: String,
    pub chunks: usize,
    pub language: Option<String>,
}

/// Best-effort language of `text`, as an ISO 639-3 code.
pub fn detect_language(text: &str) -> Option<String> {
    let info = whatlang::detect(text)?;
    info.is_reliable().then(|| info.lang().code().to_string())
}

fn io_error(path: &Path, source: std::io::Error) -> DocumentError {
    DocumentError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Turns a PDF on disk into cached, indexed-ready chunks.
pub struct PdfProcessor {
    semantic: SemanticChunker,
    fallback: RecursiveSplitter,
    cache: Option<Arc<FileCache>>,
    metrics: Arc<MetricsCollector>,
}

impl PdfProcessor {
    pub fn new(
        config: &AppConfig,
        embeddings: Arc<dyn EmbeddingProvider>,
        cache: Option<Arc<FileCache>>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        info!("Semantic chunker using {}", embeddings.model_name());
        Self {
            semantic: SemanticChunker::new(
                embeddings,
                config.breakpoint_threshold,
                config.min_chunk_size,
            ),
            fallback: RecursiveSplitter::new(config.chunk_size, config.chunk_overlap),
            cache,
            metrics,
        }
    }

    /// `pdf_chunks_{sha256(path)}_{mtime}`: a changed file gets a new key.
    pub fn cache_key(path: &Path) -> Result<String, DocumentError> {
        let modified = std::fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map_err(|e| io_error(path, e))?;
        let mtime = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Ok(format!("pdf_chunks_{}_{}", hash_hex(&path.display().to_string()), mtime))
    }

    async fn chunk_pages(&self, pages: &[Page], source: &str) -> Result<Vec<Chunk>, DocumentError> {
        match self.semantic.split_pages(pages, source).await {
            Ok(chunks) if !chunks.is_empty() => return Ok(chunks),
            Ok(_) => warn!("Semantic chunking produced no chunks, using recursive splitter"),
            Err(e) => warn!("Semantic chunking failed, using recursive splitter: {}", e),
        }
        self.fallback
            .split_pages(pages, source)
            .await
            .map_err(|e| DocumentError::Chunking(e.to_string()))
    }

    pub async fn load_and_chunk(&self, path: &Path) -> Result<Vec<Chunk>, DocumentError> {
        let filename = display_name(path);
        let cache_key = match (&self.cache, Self::cache_key(path)) {
            (Some(_), Ok(key)) => Some(key),
            (Some(_), Err(e)) => {
                error!("Error processing PDF {}: {}", filename, e);
                return Err(e);
            }
            (None, _) => None,
        };

        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(chunks) = cache.get::<Vec<Chunk>>(key) {
                info!("Loaded {} chunks from cache for {}", chunks.len(), filename);
                return Ok(chunks);
            }
        }

        info!("Loading PDF: {}", path.display());
        let result = async {
            let pages = load_pdf(path).await?;
            info!("Extracted {} pages", pages.len());
            self.chunk_pages(&pages, &path.display().to_string()).await
        }
        .await;

        let chunks = match result {
            Ok(chunks) => chunks,
            Err(e) => {
                error!("Error processing PDF {}: {}", filename, e);
                return Err(e);
            }
        };

        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            cache.set(key, &chunks);
        }
        self.metrics.log_document_processed(&filename, chunks.len());
        crate::success!("Created {} chunks from {}", chunks.len(), filename);
        Ok(chunks)
    }

    /// File facts plus the chunk count and detected language.
    pub fn document_info(path: &Path, chunks: &[Chunk]) -> Result<DocumentInfo, DocumentError> {
        let meta = std::fs::metadata(path).map_err(|e| io_error(path, e))?;
        let modified: DateTime<Utc> = meta.modified().map_err(|e| io_error(path, e))?.into();
        let size_bytes = meta.len();

        let sample: String = chunks
            .iter()
            .take(5)
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        Ok(DocumentInfo {
            filename: display_name(path),
            size_bytes,
            size_mb: (size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
            modified: modified.to_rfc3339(),
            chunks: chunks.len(),
            language: detect_language(&sample),
        })
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::document::chunker::tests::KeywordEmbeddings;
    use std::time::Duration;

    fn processor(root: &Path, cache: Option<Arc<FileCache>>) -> (PdfProcessor, Arc<MetricsCollector>) {
        let config = test_config(root);
        let metrics = Arc::new(MetricsCollector::new(&config.metrics_file));
        let processor = PdfProcessor::new(&config, Arc::new(KeywordEmbeddings), cache, metrics.clone());
        (processor, metrics)
    }

    fn chunk(text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            page: 1,
            start_index: 0,
            chunk_index: 0,
            source: "cached.pdf".to_string(),
        }
    }

    #[test]
    fn cache_key_tracks_path_and_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        let key = PdfProcessor::cache_key(&path).unwrap();
        assert!(key.starts_with("pdf_chunks_"));
        assert_eq!(key, PdfProcessor::cache_key(&path).unwrap());
        assert_ne!(key, PdfProcessor::cache_key(&dir.path().join("a.pdf.bak")).unwrap_or_default());
    }

    #[tokio::test]
    async fn cached_chunks_skip_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cached.pdf");
        // not a parseable PDF: only the cache can satisfy the request
        std::fs::write(&path, b"not a pdf").unwrap();

        let cache = Arc::new(FileCache::new(dir.path().join("cache"), Duration::from_secs(60)));
        let expected = vec![chunk("From the cache.")];
        cache.set(&PdfProcessor::cache_key(&path).unwrap(), &expected);

        let (processor, _) = processor(dir.path(), Some(cache));
        assert_eq!(processor.load_and_chunk(&path).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn unparseable_files_are_errors_and_not_counted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();

        let (processor, metrics) = processor(dir.path(), None);
        assert!(matches!(processor.load_and_chunk(&path).await, Err(DocumentError::Pdf(_))));
        assert_eq!(metrics.snapshot().documents_processed, 0);
    }

    #[tokio::test]
    async fn fallback_splitter_handles_embedding_failures() {
        struct Broken;

        #[async_trait::async_trait]
        impl EmbeddingProvider for Broken {
            async fn embed_documents(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
                Err(anyhow::anyhow!("offline"))
            }

            fn model_name(&self) -> &str {
                "broken"
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let metrics = Arc::new(MetricsCollector::new(&config.metrics_file));
        let processor = PdfProcessor::new(&config, Arc::new(Broken), None, metrics);

        let pages = vec![Page {
            number: 1,
            text: "A short page. With two sentences.".to_string(),
        }];
        let chunks = processor.chunk_pages(&pages, "doc.pdf").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "A short page. With two sentences.");
    }

    #[test]
    fn document_info_reports_size_and_language() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, vec![0u8; 1024 * 1024 + 300_000]).unwrap();

        let chunks = vec![chunk(
            "The committee reviewed the annual budget and approved the proposal \
             after a long discussion about the expected costs of the new building.",
        )];
        let info = PdfProcessor::document_info(&path, &chunks).unwrap();
        assert_eq!(info.filename, "notes.pdf");
        assert_eq!(info.size_mb, 1.29);
        assert_eq!(info.chunks, 1);
        assert_eq!(info.language.as_deref(), Some("eng"));
    }
}
