use crate::database::similarity::top_k;
use crate::database::vector_store::Retriever;
use crate::document::Chunk;
use crate::providers::traits::EmbeddingProvider;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// In-process cosine index, used when no vector database is reachable.
pub struct MemoryIndex {
    chunks: Vec<Chunk>,
    embeddings: Vec<Vec<f32>>,
    embedder: Arc<dyn EmbeddingProvider>,
    k: usize,
}

impl MemoryIndex {
    pub fn new(
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
        embedder: Arc<dyn EmbeddingProvider>,
        k: usize,
    ) -> Self {
        Self {
            chunks,
            embeddings,
            embedder,
            k,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn search(&self, query_vector: &[f32]) -> Vec<Chunk> {
        top_k(query_vector, &self.embeddings, self.k)
            .into_iter()
            .filter_map(|(index, _)| self.chunks.get(index).cloned())
            .collect()
    }
}

#[async_trait]
impl Retriever for MemoryIndex {
    async fn retrieve(&self, query: &str) -> Result<Vec<Chunk>> {
        let query_vector = self.embedder.embed_query(query).await?;
        Ok(self.search(&query_vector))
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}
