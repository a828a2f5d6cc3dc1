pub mod memory_index;
pub mod qdrant_config;
pub mod similarity;
pub mod vector_db;
pub mod vector_store;

pub use memory_index::MemoryIndex;
pub use vector_db::{VectorDB, VectorDBError};
pub use vector_store::{Retriever, SmartVectorStore, StoreInfo};
