mod analyze;
mod cache;
mod client;
mod health;
mod metrics;
mod rate_limit;

pub use analyze::analyze_handler;
pub use cache::clear_cache_handler;
pub use health::health_handler;
pub use metrics::{metrics_handler, performance_handler, reset_performance_handler};
pub use rate_limit::rate_limit_handler;
