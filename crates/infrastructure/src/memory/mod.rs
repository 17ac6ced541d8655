//! 进程内实现，用于单机运行和测试

pub mod lease;
pub mod store;

pub use lease::InMemoryLeaseService;
pub use store::InMemoryStore;
