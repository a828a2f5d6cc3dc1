pub mod cache;
pub mod logger;
pub mod metrics;

pub use cache::FileCache;
pub use logger::init_logging;
pub use metrics::{MetricsCollector, SessionMetrics};
