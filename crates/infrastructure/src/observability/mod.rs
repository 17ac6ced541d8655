//! 可观测性：结构化日志与Prometheus指标

pub mod logging;
pub mod metrics_collector;

pub use logging::{filter_directive, init_logging, LogLevelController, LoggingGuard, LOG_FILE_NAME};
pub use metrics_collector::{install_prometheus_recorder, DispatchMetrics};
