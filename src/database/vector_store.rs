use crate::config::{AppConfig, VectorStoreType};
use crate::database::memory_index::MemoryIndex;
use crate::database::similarity::mmr_select;
use crate::database::vector_db::{VectorDB, VectorDBError};
use crate::document::Chunk;
use crate::providers::traits::EmbeddingProvider;
use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;

/// Something that turns a question into the chunks most worth reading.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<Chunk>>;

    fn kind(&self) -> &'static str;
}

/// Qdrant-backed retriever. Candidates come from the collection; the
/// MMR re-ranking uses the chunk vectors kept from indexing.
pub struct QdrantRetriever {
    db: VectorDB,
    collection: String,
    embedder: Arc<dyn EmbeddingProvider>,
    embeddings: Vec<Vec<f32>>,
    k: usize,
    fetch_k: usize,
    lambda: f32,
}

#[async_trait]
impl Retriever for QdrantRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Chunk>> {
        let query_vector = self.embedder.embed_query(query).await?;
        let candidates = self
            .db
            .search_chunks(&self.collection, query_vector.clone(), self.fetch_k as u64)
            .await?;

        let (chunks, vectors): (Vec<Chunk>, Vec<Vec<f32>>) = candidates
            .into_iter()
            .filter_map(|(chunk, _)| {
                let vector = self.embeddings.get(chunk.chunk_index)?.clone();
                Some((chunk, vector))
            })
            .unzip();

        Ok(mmr_select(&query_vector, &vectors, self.k, self.lambda)
            .into_iter()
            .filter_map(|index| chunks.get(index).cloned())
            .collect())
    }

    fn kind(&self) -> &'static str {
        "qdrant"
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreInfo {
    pub status: String,
    #[serde(rename = "type")]
    pub store_type: String,
    pub using_fallback: bool,
    pub document_count: usize,
}

/// Builds a retriever over a document's chunks: Qdrant when configured
/// and reachable, the in-memory index otherwise.
pub struct SmartVectorStore {
    embedder: Arc<dyn EmbeddingProvider>,
    store_type: VectorStoreType,
    qdrant_url: String,
    collection: String,
    k: usize,
    fetch_k: usize,
    lambda: f32,
    active: Option<&'static str>,
    using_fallback: bool,
    document_count: usize,
}

impl SmartVectorStore {
    pub fn new(config: &AppConfig, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            store_type: config.vector_store_type,
            qdrant_url: config.qdrant_url.clone(),
            collection: config.collection_name.clone(),
            k: config.retrieval_k,
            fetch_k: config.fetch_k.max(config.retrieval_k),
            lambda: config.mmr_lambda,
            active: None,
            using_fallback: false,
            document_count: 0,
        }
    }

    async fn build_qdrant(
        &self,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<QdrantRetriever, VectorDBError> {
        let dimension = embeddings.first().map_or(0, Vec::len) as u64;
        let db = VectorDB::new(&self.qdrant_url).await?;
        db.recreate_collection(&self.collection, dimension).await?;
        db.upsert_chunks(&self.collection, chunks, embeddings).await?;

        Ok(QdrantRetriever {
            db,
            collection: self.collection.clone(),
            embedder: self.embedder.clone(),
            embeddings: embeddings.to_vec(),
            k: self.k,
            fetch_k: self.fetch_k,
            lambda: self.lambda,
        })
    }

    pub async fn build_store(&mut self, chunks: Vec<Chunk>) -> Result<Arc<dyn Retriever>, VectorDBError> {
        if chunks.is_empty() {
            return Err(VectorDBError::Operation("No chunks to index".to_string()));
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_documents(&texts)
            .await
            .map_err(|e| VectorDBError::Embedding(e.to_string()))?;
        if embeddings.len() != chunks.len() {
            return Err(VectorDBError::Embedding(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                embeddings.len()
            )));
        }
        self.document_count = chunks.len();

        if self.store_type != VectorStoreType::Memory {
            match self.build_qdrant(&chunks, &embeddings).await {
                Ok(retriever) => {
                    crate::success!("Qdrant collection '{}' ready with {} chunks", self.collection, chunks.len());
                    self.active = Some("qdrant");
                    self.using_fallback = false;
                    return Ok(Arc::new(retriever));
                }
                Err(e) if self.store_type == VectorStoreType::Smart => {
                    warn!("Qdrant unavailable, falling back to in-memory index: {}", e);
                    self.using_fallback = true;
                }
                Err(e) => return Err(e),
            }
        }

        let index = MemoryIndex::new(chunks, embeddings, self.embedder.clone(), self.k);
        info!("In-memory index built with {} chunks", index.len());
        self.active = Some("memory");
        Ok(Arc::new(index))
    }

    pub fn store_info(&self) -> StoreInfo {
        StoreInfo {
            status: if self.active.is_some() { "initialized" } else { "not_initialized" }.to_string(),
            store_type: self.active.unwrap_or("none").to_string(),
            using_fallback: self.using_fallback,
            document_count: self.document_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::document::chunker::tests::KeywordEmbeddings;

    fn chunk(index: usize, text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            page: index as u32 + 1,
            start_index: 0,
            chunk_index: index,
            source: "doc.pdf".to_string(),
        }
    }

    fn chunks() -> Vec<Chunk> {
        vec![
            chunk(0, "Rust ownership rules."),
            chunk(1, "The ocean covers most of the planet."),
            chunk(2, "The budget for next year."),
        ]
    }

    #[tokio::test]
    async fn memory_store_retrieves_by_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.retrieval_k = 1;

        let mut store = SmartVectorStore::new(&config, Arc::new(KeywordEmbeddings));
        assert_eq!(store.store_info().status, "not_initialized");

        let retriever = store.build_store(chunks()).await.unwrap();
        assert_eq!(retriever.kind(), "memory");

        let hits = retriever.retrieve("Tell me about the ocean").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_index, 1);

        let info = store.store_info();
        assert_eq!(info.status, "initialized");
        assert_eq!(info.store_type, "memory");
        assert!(!info.using_fallback);
        assert_eq!(info.document_count, 3);
    }

    #[tokio::test]
    async fn smart_store_falls_back_when_qdrant_is_down() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.vector_store_type = VectorStoreType::Smart;
        config.qdrant_url = "http://127.0.0.1:1".to_string();

        let mut store = SmartVectorStore::new(&config, Arc::new(KeywordEmbeddings));
        let retriever = store.build_store(chunks()).await.unwrap();
        assert_eq!(retriever.kind(), "memory");
        assert!(store.store_info().using_fallback);
    }

    #[tokio::test]
    async fn qdrant_only_store_reports_connection_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.vector_store_type = VectorStoreType::Qdrant;
        config.qdrant_url = "http://127.0.0.1:1".to_string();

        let mut store = SmartVectorStore::new(&config, Arc::new(KeywordEmbeddings));
        assert!(store.build_store(chunks()).await.is_err());
    }

    #[tokio::test]
    async fn empty_documents_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut store = SmartVectorStore::new(&config, Arc::new(KeywordEmbeddings));
        assert!(store.build_store(Vec::new()).await.is_err());
    }
}
