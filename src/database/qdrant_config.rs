use crate::database::vector_db::VectorDBError;
use qdrant_client::{config::QdrantConfig, Qdrant};
use std::time::Duration;

/// Normalizes a Qdrant address to its gRPC endpoint: adds a scheme when
/// missing and swaps the REST port 6333 for the gRPC port 6334.
pub fn grpc_url(url: &str) -> String {
    let (scheme, rest) = match url.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("http", url),
    };
    let rest = rest.trim_end_matches('/');
    let rest = match rest.strip_suffix(":6333") {
        Some(host) => format!("{}:6334", host),
        None => rest.to_string(),
    };
    format!("{}://{}", scheme, rest)
}

pub async fn create_qdrant_client(url: &str) -> Result<Qdrant, VectorDBError> {
    let url = grpc_url(url);
    log::info!("Connecting to Qdrant at {}", url);

    let mut config = QdrantConfig::from_url(&url);
    config.timeout = Duration::from_secs(30);
    config.connect_timeout = Duration::from_secs(5);

    let client = Qdrant::new(config).map_err(|e| VectorDBError::Connection(e.to_string()))?;

    // fail early instead of on the first upsert
    match client.list_collections().await {
        Ok(_) => {
            log::info!("Connected to Qdrant");
            Ok(client)
        }
        Err(e) => {
            log::error!("Qdrant connection test failed: {}", e);
            Err(VectorDBError::Connection(format!("Failed to connect to Qdrant: {}", e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_port_maps_to_grpc() {
        assert_eq!(grpc_url("http://localhost:6333"), "http://localhost:6334");
        assert_eq!(grpc_url("localhost:6333/"), "http://localhost:6334");
        assert_eq!(grpc_url("https://qdrant.example.com:6334"), "https://qdrant.example.com:6334");
    }
}
