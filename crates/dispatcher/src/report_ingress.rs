use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pollmaster_core::{DispatchError, DispatchResult};
use pollmaster_domain::entities::{DeviceResult, JobReport};
use pollmaster_domain::repositories::JobRepository;
use pollmaster_domain::value_objects::ReleaseOutcome;
use pollmaster_infrastructure::DispatchMetrics;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent_registry::AgentRegistry;
use crate::device_lock::DeviceLockManager;

/// 去重窗口默认容量
pub const DEFAULT_DEDUPE_CAPACITY: usize = 65_536;

/// 一次上报的处理结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportOutcome {
    /// 首次见到的设备结果数
    pub accepted: usize,
    pub duplicates: usize,
    /// 释放的设备锁数
    pub released: usize,
    /// 锁已被清扫或被新的分发持有
    pub stale: usize,
    pub persisted: usize,
    pub load_applied: bool,
}

/// 最近见过的 (dispatch_id, device_id)，超出容量时淘汰最早的
struct SeenWindow {
    capacity: usize,
    order: VecDeque<(Uuid, i64)>,
    keys: HashSet<(Uuid, i64)>,
}

impl SeenWindow {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            keys: HashSet::new(),
        }
    }

    /// 首次见到返回 `true`
    fn insert(&mut self, key: (Uuid, i64)) -> bool {
        if !self.keys.insert(key) {
            return false;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.keys.remove(&oldest);
            }
        }
        true
    }

    fn remove(&mut self, key: &(Uuid, i64)) {
        if self.keys.remove(key) {
            self.order.retain(|seen| seen != key);
        }
    }
}

/// Agent上报处理
///
/// 释放对应的设备锁，保存结果，并把负载样本记入注册表。重复的上报是幂等的。
pub struct ReportIngress {
    registry: Arc<AgentRegistry>,
    locks: Arc<DeviceLockManager>,
    jobs: Arc<dyn JobRepository>,
    seen: Mutex<SeenWindow>,
    metrics: DispatchMetrics,
}

impl ReportIngress {
    pub fn new(
        registry: Arc<AgentRegistry>,
        locks: Arc<DeviceLockManager>,
        jobs: Arc<dyn JobRepository>,
        metrics: DispatchMetrics,
    ) -> Self {
        Self::with_capacity(registry, locks, jobs, metrics, DEFAULT_DEDUPE_CAPACITY)
    }

    pub fn with_capacity(
        registry: Arc<AgentRegistry>,
        locks: Arc<DeviceLockManager>,
        jobs: Arc<dyn JobRepository>,
        metrics: DispatchMetrics,
        capacity: usize,
    ) -> Self {
        Self {
            registry,
            locks,
            jobs,
            seen: Mutex::new(SeenWindow::new(capacity)),
            metrics,
        }
    }

    pub async fn handle(&self, report: JobReport) -> DispatchResult<ReportOutcome> {
        report.validate().map_err(DispatchError::InvalidReport)?;

        let fresh: Vec<_> = {
            let mut seen = self.seen.lock().await;
            report
                .results
                .iter()
                .filter(|result| seen.insert((report.dispatch_id, result.device_id)))
                .collect()
        };

        let mut outcome = ReportOutcome {
            accepted: fresh.len(),
            duplicates: report.results.len() - fresh.len(),
            ..Default::default()
        };

        if fresh.is_empty() {
            info!(dispatch_id = %report.dispatch_id, agent_id = report.agent_id, "重复的上报，已忽略");
            self.metrics.record_report(report.kind, 0, outcome.duplicates);
            return Ok(outcome);
        }

        let now = Utc::now();
        for (index, result) in fresh.iter().enumerate() {
            if let Err(e) = self.apply_result(&report, result, now, &mut outcome).await {
                warn!(
                    device_id = result.device_id,
                    dispatch_id = %report.dispatch_id,
                    "处理上报失败，等待Agent重发: {}",
                    e
                );
                // 未处理完的结果移出去重窗口，重发时按首次上报处理
                let mut seen = self.seen.lock().await;
                for pending in &fresh[index..] {
                    seen.remove(&(report.dispatch_id, pending.device_id));
                }
                return Err(e);
            }
        }

        if let Some(load) = report.load {
            outcome.load_applied = self.registry.record_load(report.agent_id, load, now).await;
            if !outcome.load_applied {
                debug!(agent_id = report.agent_id, "上报来自未知Agent，忽略负载");
            }
        }

        self.metrics
            .record_report(report.kind, outcome.accepted, outcome.duplicates);
        Ok(outcome)
    }

    /// 释放设备锁并保存单个设备的结果
    async fn apply_result(
        &self,
        report: &JobReport,
        result: &DeviceResult,
        now: DateTime<Utc>,
        outcome: &mut ReportOutcome,
    ) -> DispatchResult<()> {
        match self
            .locks
            .release_dispatch(result.device_id, report.dispatch_id)
            .await?
        {
            ReleaseOutcome::Released => outcome.released += 1,
            ReleaseOutcome::NotHeld | ReleaseOutcome::HeldByOther => {
                outcome.stale += 1;
                debug!(
                    device_id = result.device_id,
                    dispatch_id = %report.dispatch_id,
                    "上报到达前设备锁已被释放"
                );
            }
        }

        if self.jobs.record_outcome(report, result, now).await? {
            outcome.persisted += 1;
        } else {
            debug!(device_id = result.device_id, "结果已存在或设备已删除");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seen_window_evicts_oldest() {
        let mut window = SeenWindow::new(2);
        let id = Uuid::new_v4();

        assert!(window.insert((id, 1)));
        assert!(!window.insert((id, 1)));
        assert!(window.insert((id, 2)));
        assert!(window.insert((id, 3)));

        // 1 已被淘汰
        assert!(window.insert((id, 1)));
        assert!(!window.insert((id, 3)));
    }

    #[test]
    fn test_seen_window_remove_allows_reinsert() {
        let mut window = SeenWindow::new(2);
        let id = Uuid::new_v4();

        assert!(window.insert((id, 1)));
        window.remove(&(id, 1));
        assert!(window.insert((id, 1)));
        assert_eq!(window.order.len(), 1);
    }
}
