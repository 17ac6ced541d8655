pub mod config;
pub mod errors;
pub mod shutdown;

pub use config::AppConfig;
pub use errors::*;
pub use shutdown::{ShutdownManager, ShutdownReason};
