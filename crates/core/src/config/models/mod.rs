pub mod api_observability;
pub mod app_config;
pub mod cluster;
pub mod database;
pub mod dispatcher;

// Re-export main types for easier imports
pub use api_observability::{ObservabilityConfig, ServerConfig, MAX_LOG_LEVEL};
pub use app_config::AppConfig;
pub use cluster::ClusterConfig;
pub use database::{is_postgres_url, DatabaseConfig};
pub use dispatcher::DispatcherConfig;
