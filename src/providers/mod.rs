pub mod openai;
pub mod openrouter;
pub mod traits;
pub mod utils;

pub use openai::OpenAIEmbeddings;
pub use openrouter::{LlmSettings, OpenRouterProvider};
pub use traits::{ChatMessage, ChatProvider, EmbeddingProvider, Role, TokenStream};
