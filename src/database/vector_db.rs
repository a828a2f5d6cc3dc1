use crate::database::qdrant_config::create_qdrant_client;
use crate::document::Chunk;
use qdrant_client::{
    qdrant::{
        point_id::PointIdOptions, value::Kind, vectors_config::Config,
        with_payload_selector::SelectorOptions, CreateCollection, DeleteCollection, Distance,
        PointId, PointStruct, SearchPoints, UpsertPoints, Value, VectorParams, VectorsConfig,
        WithPayloadSelector,
    },
    Qdrant,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

const UPSERT_BATCH: usize = 128;

#[derive(Error, Debug)]
pub enum VectorDBError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Operation failed: {0}")]
    Operation(String),
    #[error("Embedding failed: {0}")]
    Embedding(String),
    #[error("Invalid point payload: {0}")]
    Payload(String),
}

/// Qdrant collection holding one document's chunk vectors.
#[derive(Clone)]
pub struct VectorDB {
    client: Arc<Qdrant>,
}

fn chunk_payload(chunk: &Chunk) -> HashMap<String, Value> {
    HashMap::from([
        ("text".to_string(), Value::from(chunk.text.clone())),
        ("source".to_string(), Value::from(chunk.source.clone())),
        ("page".to_string(), Value::from(chunk.page as i64)),
        ("start_index".to_string(), Value::from(chunk.start_index as i64)),
        ("chunk_index".to_string(), Value::from(chunk.chunk_index as i64)),
    ])
}

fn payload_str(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}

fn payload_int(payload: &HashMap<String, Value>, key: &str) -> Option<i64> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::IntegerValue(n) => Some(*n),
        Kind::DoubleValue(f) => Some(*f as i64),
        _ => None,
    }
}

pub(crate) fn chunk_from_payload(payload: &HashMap<String, Value>) -> Result<Chunk, VectorDBError> {
    let missing = |key: &str| VectorDBError::Payload(format!("missing field '{}'", key));
    Ok(Chunk {
        text: payload_str(payload, "text").ok_or_else(|| missing("text"))?,
        source: payload_str(payload, "source").unwrap_or_default(),
        page: payload_int(payload, "page").ok_or_else(|| missing("page"))? as u32,
        start_index: payload_int(payload, "start_index").unwrap_or(0) as usize,
        chunk_index: payload_int(payload, "chunk_index").ok_or_else(|| missing("chunk_index"))? as usize,
    })
}

impl VectorDB {
    pub async fn new(url: &str) -> Result<Self, VectorDBError> {
        let client = create_qdrant_client(url).await?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    pub async fn create_collection(&self, name: &str, vector_size: u64) -> Result<(), VectorDBError> {
        let vectors_config = VectorsConfig {
            config: Some(Config::Params(VectorParams {
                size: vector_size,
                distance: Distance::Cosine.into(),
                ..Default::default()
            })),
        };

        let create_collection = CreateCollection {
            collection_name: name.to_string(),
            vectors_config: Some(vectors_config),
            ..Default::default()
        };

        match self.client.create_collection(create_collection).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("already exists") => {
                log::info!("Collection {} already exists, skipping creation", name);
                Ok(())
            }
            Err(e) => Err(VectorDBError::Operation(e.to_string())),
        }
    }

    pub async fn delete_collection(&self, name: &str) -> Result<(), VectorDBError> {
        let request = DeleteCollection {
            collection_name: name.to_string(),
            ..Default::default()
        };
        self.client
            .delete_collection(request)
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;
        Ok(())
    }

    /// Drops any previous contents of `name` and creates it empty.
    pub async fn recreate_collection(&self, name: &str, vector_size: u64) -> Result<(), VectorDBError> {
        if let Err(e) = self.delete_collection(name).await {
            log::debug!("Nothing to drop for collection {}: {}", name, e);
        }
        self.create_collection(name, vector_size).await
    }

    pub async fn upsert_chunks(
        &self,
        collection: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize, VectorDBError> {
        if chunks.len() != embeddings.len() {
            return Err(VectorDBError::Operation(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                embeddings.len()
            )));
        }

        let points: Vec<PointStruct> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, vector)| PointStruct {
                id: Some(PointId {
                    point_id_options: Some(PointIdOptions::Uuid(Uuid::new_v4().to_string())),
                }),
                vectors: Some(vector.clone().into()),
                payload: chunk_payload(chunk),
            })
            .collect();

        let total = points.len();
        let mut points = points.into_iter().peekable();
        while points.peek().is_some() {
            let batch: Vec<PointStruct> = points.by_ref().take(UPSERT_BATCH).collect();
            let upsert_points = UpsertPoints {
                collection_name: collection.to_string(),
                wait: Some(true),
                points: batch,
                ..Default::default()
            };
            self.client
                .upsert_points(upsert_points)
                .await
                .map_err(|e| VectorDBError::Operation(e.to_string()))?;
        }

        log::debug!("Upserted {} points into {}", total, collection);
        Ok(total)
    }

    /// Chunks nearest to `query_vector`, best first, with their scores.
    pub async fn search_chunks(
        &self,
        collection: &str,
        query_vector: Vec<f32>,
        limit: u64,
    ) -> Result<Vec<(Chunk, f32)>, VectorDBError> {
        let request = SearchPoints {
            collection_name: collection.to_string(),
            vector: query_vector,
            limit,
            with_payload: Some(WithPayloadSelector {
                selector_options: Some(SelectorOptions::Enable(true)),
            }),
            ..Default::default()
        };

        let results = self
            .client
            .search_points(request)
            .await
            .map_err(|e| VectorDBError::Operation(e.to_string()))?;

        results
            .result
            .into_iter()
            .map(|point| Ok((chunk_from_payload(&point.payload)?, point.score)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_round_trips_a_chunk() {
        let chunk = Chunk {
            text: "Revenue grew 12%.".to_string(),
            page: 4,
            start_index: 120,
            chunk_index: 7,
            source: "annual.pdf".to_string(),
        };
        assert_eq!(chunk_from_payload(&chunk_payload(&chunk)).unwrap(), chunk);
    }

    #[test]
    fn payload_without_text_is_rejected() {
        let mut payload = chunk_payload(&Chunk {
            text: "x".to_string(),
            page: 1,
            start_index: 0,
            chunk_index: 0,
            source: String::new(),
        });
        payload.remove("text");
        assert!(matches!(chunk_from_payload(&payload), Err(VectorDBError::Payload(_))));
    }
}
