//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口，PostgreSQL与内存实现位于基础设施层

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pollmaster_core::DispatchResult;
use uuid::Uuid;

use crate::entities::{Agent, Device, DeviceInput, DeviceResult, JobKind, JobReport, PollingJob};
use crate::value_objects::ReleaseOutcome;

/// Agent仓储抽象
#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// 所有已启用的Agent，按id升序
    async fn list_active(&self) -> DispatchResult<Vec<Agent>>;
}

/// 设备仓储抽象
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    async fn list(&self) -> DispatchResult<Vec<Device>>;
    async fn get(&self, id: i64) -> DispatchResult<Option<Device>>;
    async fn create(&self, input: &DeviceInput) -> DispatchResult<Device>;
    /// 设备不存在时返回 `DeviceNotFound`
    async fn update(&self, id: i64, input: &DeviceInput) -> DispatchResult<Device>;
    /// 以hostname为键创建或更新
    async fn upsert(&self, input: &DeviceInput) -> DispatchResult<Device>;
    async fn delete(&self, id: i64) -> DispatchResult<bool>;
    /// 持久化设备与Agent的绑定
    async fn assign_agent(&self, device_id: i64, agent_id: i64) -> DispatchResult<()>;
}

/// 轮询任务仓储抽象
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 到期的任务，按到期时间升序，最多 `limit` 个
    ///
    /// 不过滤已加锁的设备，由调度器尝试加锁时决定是否跳过。
    async fn fetch_due_jobs(
        &self,
        kind: JobKind,
        now: DateTime<Utc>,
        limit: usize,
    ) -> DispatchResult<Vec<PollingJob>>;

    /// 分发成功后把下次到期时间推进一个周期
    async fn mark_dispatched(
        &self,
        kind: JobKind,
        device_id: i64,
        at: DateTime<Utc>,
    ) -> DispatchResult<()>;

    /// 保存单个设备的结果，重复的 (dispatch_id, device_id) 返回 `false`
    async fn record_outcome(
        &self,
        report: &JobReport,
        result: &DeviceResult,
        at: DateTime<Utc>,
    ) -> DispatchResult<bool>;
}

/// 存储层持有的设备锁，对集群内所有进程可见
#[async_trait]
pub trait DeviceLockStore: Send + Sync {
    /// 设备已被锁定时返回 `false`
    async fn try_lock(&self, device_id: i64, token: Uuid, at: DateTime<Utc>)
        -> DispatchResult<bool>;

    /// 无条件释放，对未加锁的设备是空操作
    async fn unlock(&self, device_id: i64) -> DispatchResult<()>;

    /// 仅当锁仍由 `token` 持有时释放
    async fn release_if_token(&self, device_id: i64, token: Uuid)
        -> DispatchResult<ReleaseOutcome>;

    /// 强制释放 `cutoff` 之前获取的锁，返回被释放的设备id
    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> DispatchResult<Vec<i64>>;
}
