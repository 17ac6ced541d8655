//! 领域对外部协作者的端口

pub mod agent_client;
pub mod lease;

pub use agent_client::{AgentClient, AgentHealth};
pub use lease::LeaseService;
