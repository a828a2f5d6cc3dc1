pub mod chunker;
pub mod loader;
pub mod processor;

pub use chunker::{Chunk, Chunker, RecursiveSplitter, SemanticChunker};
pub use loader::{load_pdf, DocumentError, Page};
pub use processor::{detect_language, DocumentInfo, PdfProcessor};
