pub mod api;
pub mod commands;
pub mod config;
pub mod database;
pub mod document;
pub mod llm;
pub mod providers;
pub mod session;
pub mod utils;

pub use config::AppConfig;
pub use session::ChatSession;
