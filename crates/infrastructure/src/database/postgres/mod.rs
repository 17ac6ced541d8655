pub mod postgres_agent_repository;
pub mod postgres_device_lock_store;
pub mod postgres_device_repository;
pub mod postgres_job_repository;
pub mod postgres_lease;

pub use postgres_agent_repository::*;
pub use postgres_device_lock_store::*;
pub use postgres_device_repository::PostgresDeviceRepository;
pub use postgres_job_repository::*;
pub use postgres_lease::*;
