use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use pollmaster_core::config::DispatcherConfig;
use pollmaster_core::DispatchResult;
use pollmaster_domain::entities::{Agent, DispatchRequest, DispatchTarget, JobKind, PollingJob};
use pollmaster_domain::repositories::{DeviceRepository, JobRepository};
use pollmaster_infrastructure::DispatchMetrics;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent_registry::AgentRegistry;
use crate::device_lock::DeviceLockManager;
use crate::outbound::DispatchOutbox;

/// 调度参数
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub max_snmp_jobs: usize,
    pub max_ping_jobs: usize,
    pub ping_batch_count: usize,
    /// Agent完成后上报的地址
    pub report_hosts: Vec<String>,
}

impl SchedulerSettings {
    pub fn new(config: &DispatcherConfig, report_hosts: Vec<String>) -> Self {
        Self {
            max_snmp_jobs: config.max_snmp_jobs,
            max_ping_jobs: config.max_ping_jobs,
            ping_batch_count: config.ping_batch_count.max(1),
            report_hosts,
        }
    }

    fn max_jobs(&self, kind: JobKind) -> usize {
        match kind {
            JobKind::Snmp => self.max_snmp_jobs,
            JobKind::Ping => self.max_ping_jobs,
        }
    }
}

/// 一次调度周期的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub fetched: usize,
    pub skipped_locked: usize,
    pub no_agent: usize,
    /// 已交给出站worker的设备数
    pub dispatched: usize,
    pub requests: usize,
    /// 投递到出站队列失败的设备数
    pub rejected: usize,
}

/// SNMP与ping的周期调度
///
/// 每个周期：拉取到期任务 → 逐个加锁并放置 → 交给出站worker。
pub struct JobScheduler {
    jobs: Arc<dyn JobRepository>,
    devices: Arc<dyn DeviceRepository>,
    registry: Arc<AgentRegistry>,
    locks: Arc<DeviceLockManager>,
    outbox: DispatchOutbox,
    settings: SchedulerSettings,
    metrics: DispatchMetrics,
}

impl JobScheduler {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        devices: Arc<dyn DeviceRepository>,
        registry: Arc<AgentRegistry>,
        locks: Arc<DeviceLockManager>,
        outbox: DispatchOutbox,
        settings: SchedulerSettings,
        metrics: DispatchMetrics,
    ) -> Self {
        Self {
            jobs,
            devices,
            registry,
            locks,
            outbox,
            settings,
            metrics,
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// SNMP调度周期，每个设备一个分发请求
    pub async fn run_snmp_tick(&self, now: DateTime<Utc>) -> DispatchResult<TickSummary> {
        let started = Instant::now();
        let kind = JobKind::Snmp;
        let jobs = self
            .jobs
            .fetch_due_jobs(kind, now, self.settings.max_jobs(kind))
            .await?;

        let mut summary = TickSummary {
            fetched: jobs.len(),
            ..Default::default()
        };

        for job in jobs {
            let dispatch_id = Uuid::new_v4();
            let Some(agent) = self.lock_and_place(&job, dispatch_id, now, &mut summary).await
            else {
                continue;
            };

            let request = DispatchRequest {
                dispatch_id,
                kind,
                agent,
                targets: vec![job.device.to_target(kind)],
                report_hosts: self.settings.report_hosts.clone(),
            };
            self.hand_off(request, &mut summary).await;
        }

        self.finish_tick(kind, &summary, started);
        Ok(summary)
    }

    /// ping调度周期
    ///
    /// 按Agent分组，每组按 `ping_batch_count` 切分成多个请求。同一周期的所有
    /// 请求共用一个分发ID。
    pub async fn run_ping_tick(&self, now: DateTime<Utc>) -> DispatchResult<TickSummary> {
        let started = Instant::now();
        let kind = JobKind::Ping;
        let jobs = self
            .jobs
            .fetch_due_jobs(kind, now, self.settings.max_jobs(kind))
            .await?;

        let mut summary = TickSummary {
            fetched: jobs.len(),
            ..Default::default()
        };

        let dispatch_id = Uuid::new_v4();
        let mut by_agent: BTreeMap<i64, (Agent, Vec<DispatchTarget>)> = BTreeMap::new();
        for job in jobs {
            let Some(agent) = self.lock_and_place(&job, dispatch_id, now, &mut summary).await
            else {
                continue;
            };
            by_agent
                .entry(agent.id)
                .or_insert_with(|| (agent, Vec::new()))
                .1
                .push(job.device.to_target(kind));
        }

        for (agent, targets) in by_agent.into_values() {
            for chunk in targets.chunks(self.settings.ping_batch_count) {
                let request = DispatchRequest {
                    dispatch_id,
                    kind,
                    agent: agent.clone(),
                    targets: chunk.to_vec(),
                    report_hosts: self.settings.report_hosts.clone(),
                };
                self.hand_off(request, &mut summary).await;
            }
        }

        self.finish_tick(kind, &summary, started);
        Ok(summary)
    }

    /// 加锁并为任务选择Agent
    ///
    /// 设备已锁定时跳过，任务保持到期；没有可用Agent时立即释放锁。
    /// 绑定变化在分发前写入存储。
    async fn lock_and_place(
        &self,
        job: &PollingJob,
        token: Uuid,
        now: DateTime<Utc>,
        summary: &mut TickSummary,
    ) -> Option<Agent> {
        let device = &job.device;

        match self.locks.try_lock(device.id, token).await {
            Ok(true) => {}
            Ok(false) => {
                summary.skipped_locked += 1;
                self.metrics.record_locked_skip(job.kind);
                return None;
            }
            Err(e) => {
                warn!(device_id = device.id, "设备加锁失败: {}", e);
                return None;
            }
        }

        let Some(placement) = self.registry.select_agent(device, now).await else {
            debug!(device_id = device.id, kind = %job.kind, "没有可用的Agent");
            summary.no_agent += 1;
            self.metrics.record_no_agent(job.kind);
            self.release(device.id, token).await;
            return None;
        };

        if placement.reassigned {
            if let Err(e) = self
                .devices
                .assign_agent(device.id, placement.agent.id)
                .await
            {
                warn!(device_id = device.id, "保存设备绑定失败: {}", e);
                self.release(device.id, token).await;
                return None;
            }
            if let Some(from) = placement.unstuck_from {
                info!(
                    device_id = device.id,
                    from,
                    to = placement.agent.id,
                    "设备已迁移到负载更低的Agent"
                );
                self.metrics.record_unstick();
            }
        }

        Some(placement.agent)
    }

    async fn hand_off(&self, request: DispatchRequest, summary: &mut TickSummary) {
        let targets = request.targets.len();
        match self.outbox.submit(request) {
            Ok(()) => {
                summary.requests += 1;
                summary.dispatched += targets;
            }
            Err(request) => {
                summary.rejected += targets;
                self.locks
                    .release_all(&request.device_ids(), request.dispatch_id)
                    .await;
            }
        }
    }

    async fn release(&self, device_id: i64, token: Uuid) {
        if let Err(e) = self.locks.release_dispatch(device_id, token).await {
            warn!(device_id, "释放设备锁失败: {}", e);
        }
    }

    fn finish_tick(&self, kind: JobKind, summary: &TickSummary, started: Instant) {
        let elapsed = started.elapsed().as_secs_f64();
        self.metrics
            .record_tick(kind, summary.fetched, summary.dispatched, elapsed);
        if summary.fetched > 0 {
            debug!(
                kind = %kind,
                fetched = summary.fetched,
                skipped_locked = summary.skipped_locked,
                no_agent = summary.no_agent,
                dispatched = summary.dispatched,
                requests = summary.requests,
                "调度周期完成"
            );
        }
    }
}
