//! 分发引擎
//!
//! 主节点选举、Agent注册表、设备锁、SNMP/ping调度周期和上报处理。
//! 所有周期任务只在持有集群租约的进程上运行。

pub mod agent_registry;
pub mod controller;
pub mod device_lock;
pub mod leader;
pub mod outbound;
pub mod periodic;
pub mod report_ingress;
pub mod scheduler;

#[cfg(test)]
pub mod test_utils;

pub use agent_registry::{AgentRegistry, CheckSummary, Placement, RegistrySettings};
pub use controller::{DispatchController, DispatchDeps, RunOutcome};
pub use device_lock::DeviceLockManager;
pub use leader::{Acquisition, LeaderCoordinator, Role};
pub use outbound::{DispatchOutbox, DispatchWorker};
pub use periodic::{AgentCheckCycle, CycleStep, TickCounter};
pub use report_ingress::{ReportIngress, ReportOutcome};
pub use scheduler::{JobScheduler, SchedulerSettings, TickSummary};
