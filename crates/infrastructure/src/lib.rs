pub mod agent_client;
pub mod database;
pub mod memory;
pub mod observability;

pub use agent_client::HttpAgentClient;
pub use database::*;
pub use memory::{InMemoryLeaseService, InMemoryStore};
pub use observability::*;
