use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pollmaster_core::{DispatchError, DispatchResult};
use pollmaster_domain::{
    entities::{Agent, Device, DeviceInput, DeviceLock, DeviceResult, JobKind, JobReport, PollingJob},
    repositories::{AgentRepository, DeviceLockStore, DeviceRepository, JobRepository},
    value_objects::ReleaseOutcome,
};
use tokio::sync::Mutex;
use uuid::Uuid;

/// 已保存的单个设备结果
#[derive(Debug, Clone)]
pub struct StoredOutcome {
    pub dispatch_id: Uuid,
    pub device_id: i64,
    pub agent_id: i64,
    pub kind: JobKind,
    pub success: bool,
    pub reported_at: DateTime<Utc>,
}

#[derive(Default)]
struct StoreState {
    agents: BTreeMap<i64, Agent>,
    devices: BTreeMap<i64, Device>,
    next_device_id: i64,
    outcome_keys: HashSet<(Uuid, i64)>,
    outcomes: Vec<StoredOutcome>,
}

/// 内存存储，同时实现全部仓储接口
///
/// 克隆共享同一份状态。
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_agent(&self, agent: Agent) {
        self.state.lock().await.agents.insert(agent.id, agent);
    }

    pub async fn remove_agent(&self, agent_id: i64) -> bool {
        self.state.lock().await.agents.remove(&agent_id).is_some()
    }

    pub async fn device(&self, device_id: i64) -> Option<Device> {
        self.state.lock().await.devices.get(&device_id).cloned()
    }

    pub async fn lock_of(&self, device_id: i64) -> Option<DeviceLock> {
        self.state
            .lock()
            .await
            .devices
            .get(&device_id)
            .and_then(|d| d.lock)
    }

    /// 直接设置下次到期时间
    pub async fn set_next_due(&self, device_id: i64, kind: JobKind, at: DateTime<Utc>) {
        if let Some(device) = self.state.lock().await.devices.get_mut(&device_id) {
            device.set_next_due(kind, at);
        }
    }

    pub async fn outcomes(&self) -> Vec<StoredOutcome> {
        self.state.lock().await.outcomes.clone()
    }
}

#[async_trait]
impl AgentRepository for InMemoryStore {
    async fn list_active(&self) -> DispatchResult<Vec<Agent>> {
        Ok(self.state.lock().await.agents.values().cloned().collect())
    }
}

#[async_trait]
impl DeviceRepository for InMemoryStore {
    async fn list(&self) -> DispatchResult<Vec<Device>> {
        Ok(self.state.lock().await.devices.values().cloned().collect())
    }

    async fn get(&self, id: i64) -> DispatchResult<Option<Device>> {
        Ok(self.state.lock().await.devices.get(&id).cloned())
    }

    async fn create(&self, input: &DeviceInput) -> DispatchResult<Device> {
        let mut state = self.state.lock().await;
        if state.devices.values().any(|d| d.hostname == input.hostname) {
            return Err(DispatchError::Conflict(format!(
                "设备hostname已存在: {}",
                input.hostname
            )));
        }

        state.next_device_id += 1;
        let device = Device::from_input(state.next_device_id, input, Utc::now());
        state.devices.insert(device.id, device.clone());
        Ok(device)
    }

    async fn update(&self, id: i64, input: &DeviceInput) -> DispatchResult<Device> {
        let mut state = self.state.lock().await;
        if state
            .devices
            .values()
            .any(|d| d.id != id && d.hostname == input.hostname)
        {
            return Err(DispatchError::Conflict(format!(
                "设备hostname已存在: {}",
                input.hostname
            )));
        }

        let device = state
            .devices
            .get_mut(&id)
            .ok_or(DispatchError::DeviceNotFound { id })?;
        device.apply(input, Utc::now());
        Ok(device.clone())
    }

    async fn upsert(&self, input: &DeviceInput) -> DispatchResult<Device> {
        let existing = {
            let state = self.state.lock().await;
            state
                .devices
                .values()
                .find(|d| d.hostname == input.hostname)
                .map(|d| d.id)
        };

        match existing {
            Some(id) => self.update(id, input).await,
            None => self.create(input).await,
        }
    }

    async fn delete(&self, id: i64) -> DispatchResult<bool> {
        Ok(self.state.lock().await.devices.remove(&id).is_some())
    }

    async fn assign_agent(&self, device_id: i64, agent_id: i64) -> DispatchResult<()> {
        let mut state = self.state.lock().await;
        let device = state
            .devices
            .get_mut(&device_id)
            .ok_or(DispatchError::DeviceNotFound { id: device_id })?;
        device.agent_id = Some(agent_id);
        device.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl JobRepository for InMemoryStore {
    async fn fetch_due_jobs(
        &self,
        kind: JobKind,
        now: DateTime<Utc>,
        limit: usize,
    ) -> DispatchResult<Vec<PollingJob>> {
        let state = self.state.lock().await;
        let mut jobs: Vec<PollingJob> = state
            .devices
            .values()
            .filter(|d| d.is_enabled(kind) && d.due_at(kind) <= now)
            .map(|d| PollingJob {
                kind,
                device: d.clone(),
                due_at: d.due_at(kind),
            })
            .collect();

        jobs.sort_by(|a, b| a.due_at.cmp(&b.due_at).then(a.device.id.cmp(&b.device.id)));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn mark_dispatched(
        &self,
        kind: JobKind,
        device_id: i64,
        at: DateTime<Utc>,
    ) -> DispatchResult<()> {
        if let Some(device) = self.state.lock().await.devices.get_mut(&device_id) {
            let next = at + device.frequency(kind);
            device.set_next_due(kind, next);
        }
        Ok(())
    }

    async fn record_outcome(
        &self,
        report: &JobReport,
        result: &DeviceResult,
        at: DateTime<Utc>,
    ) -> DispatchResult<bool> {
        let mut state = self.state.lock().await;
        if !state.devices.contains_key(&result.device_id) {
            return Ok(false);
        }
        if !state
            .outcome_keys
            .insert((report.dispatch_id, result.device_id))
        {
            return Ok(false);
        }

        state.outcomes.push(StoredOutcome {
            dispatch_id: report.dispatch_id,
            device_id: result.device_id,
            agent_id: report.agent_id,
            kind: report.kind,
            success: result.success,
            reported_at: at,
        });
        Ok(true)
    }
}

#[async_trait]
impl DeviceLockStore for InMemoryStore {
    async fn try_lock(
        &self,
        device_id: i64,
        token: Uuid,
        at: DateTime<Utc>,
    ) -> DispatchResult<bool> {
        let mut state = self.state.lock().await;
        match state.devices.get_mut(&device_id) {
            Some(device) if device.lock.is_none() => {
                device.lock = Some(DeviceLock {
                    token,
                    locked_at: at,
                });
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn unlock(&self, device_id: i64) -> DispatchResult<()> {
        if let Some(device) = self.state.lock().await.devices.get_mut(&device_id) {
            device.lock = None;
        }
        Ok(())
    }

    async fn release_if_token(
        &self,
        device_id: i64,
        token: Uuid,
    ) -> DispatchResult<ReleaseOutcome> {
        let mut state = self.state.lock().await;
        let Some(device) = state.devices.get_mut(&device_id) else {
            return Ok(ReleaseOutcome::NotHeld);
        };

        Ok(match device.lock {
            None => ReleaseOutcome::NotHeld,
            Some(lock) if lock.token == token => {
                device.lock = None;
                ReleaseOutcome::Released
            }
            Some(_) => ReleaseOutcome::HeldByOther,
        })
    }

    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> DispatchResult<Vec<i64>> {
        let mut state = self.state.lock().await;
        let mut released = Vec::new();
        for device in state.devices.values_mut() {
            if matches!(device.lock, Some(lock) if lock.locked_at < cutoff) {
                device.lock = None;
                released.push(device.id);
            }
        }
        Ok(released)
    }
}
