pub mod memory;
pub mod rag;

pub use memory::{ConversationMemory, Exchange};
pub use rag::{PipelineInfo, RagPipeline};
