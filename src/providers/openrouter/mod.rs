pub mod openrouter;

pub use openrouter::{ConnectionReport, LlmSettings, OpenRouterProvider};
