use crate::providers::traits::EmbeddingProvider;
use anyhow::{anyhow, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{CreateEmbeddingRequestArgs, EmbeddingInput},
    Client,
};
use async_trait::async_trait;
use log::debug;

/// Texts sent per embeddings request.
const BATCH_SIZE: usize = 64;

/// Hosted embedding model reached through the OpenAI embeddings API shape.
#[derive(Clone)]
pub struct OpenAIEmbeddings {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAIEmbeddings {
    pub fn new(api_key: &str, api_base: &str, model: &str) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base.trim_end_matches('/'));
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddings {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(BATCH_SIZE) {
            let request = CreateEmbeddingRequestArgs::default()
                .model(&self.model)
                .input(EmbeddingInput::StringArray(batch.to_vec()))
                .build()?;

            let response = self.client.embeddings().create(request).await?;
            let mut data = response.data;
            if data.len() != batch.len() {
                return Err(anyhow!(
                    "Embedding count mismatch: sent {} texts, received {} vectors",
                    batch.len(),
                    data.len()
                ));
            }
            data.sort_by_key(|embedding| embedding.index);
            embeddings.extend(data.into_iter().map(|embedding| embedding.embedding));
        }

        debug!("Embedded {} texts with {}", texts.len(), self.model);
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
