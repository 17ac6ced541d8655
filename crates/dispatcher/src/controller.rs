use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pollmaster_core::config::DispatcherConfig;
use pollmaster_core::{DispatchResult, ShutdownManager, ShutdownReason};
use pollmaster_domain::entities::DispatchRequest;
use pollmaster_domain::ports::AgentClient;
use pollmaster_domain::repositories::{
    AgentRepository, DeviceLockStore, DeviceRepository, JobRepository,
};
use pollmaster_infrastructure::DispatchMetrics;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::agent_registry::{AgentRegistry, RegistrySettings};
use crate::device_lock::DeviceLockManager;
use crate::leader::{Acquisition, LeaderCoordinator};
use crate::outbound::{DispatchOutbox, DispatchWorker};
use crate::periodic::{run_periodic, AgentCheckCycle};
use crate::report_ingress::ReportIngress;
use crate::scheduler::{JobScheduler, SchedulerSettings};

/// 关闭存活检查时租约校验的默认周期
const DEFAULT_LEASE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// 分发引擎依赖的外部协作者
#[derive(Clone)]
pub struct DispatchDeps {
    pub agents: Arc<dyn AgentRepository>,
    pub devices: Arc<dyn DeviceRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub lock_store: Arc<dyn DeviceLockStore>,
    pub client: Arc<dyn AgentClient>,
}

/// `run` 的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// 作为主节点运行直到关闭
    Completed,
    /// 还在等待租约时就收到了关闭信号
    Cancelled,
}

/// 分发控制器
///
/// 负责主节点生命周期：等待租约、加载Agent、启动所有周期任务，
/// 关闭时等待任务退出并释放租约。
pub struct DispatchController {
    config: DispatcherConfig,
    leader: Arc<LeaderCoordinator>,
    registry: Arc<AgentRegistry>,
    locks: Arc<DeviceLockManager>,
    scheduler: Arc<JobScheduler>,
    worker: Arc<DispatchWorker>,
    ingress: Arc<ReportIngress>,
    outbox_rx: Mutex<Option<mpsc::Receiver<DispatchRequest>>>,
    shutdown: ShutdownManager,
}

impl DispatchController {
    pub fn new(
        deps: DispatchDeps,
        config: &DispatcherConfig,
        report_hosts: Vec<String>,
        leader: Arc<LeaderCoordinator>,
        shutdown: ShutdownManager,
        metrics: DispatchMetrics,
    ) -> Self {
        let registry = Arc::new(AgentRegistry::new(
            deps.agents,
            deps.client.clone(),
            RegistrySettings::from(config),
            metrics.clone(),
        ));
        let locks = Arc::new(DeviceLockManager::new(deps.lock_store, metrics.clone()));
        let (outbox, outbox_rx) = DispatchOutbox::channel(config.outbox_capacity, metrics.clone());

        let scheduler = Arc::new(JobScheduler::new(
            deps.jobs.clone(),
            deps.devices,
            registry.clone(),
            locks.clone(),
            outbox,
            SchedulerSettings::new(config, report_hosts),
            metrics.clone(),
        ));
        let worker = Arc::new(DispatchWorker::new(
            deps.client,
            registry.clone(),
            locks.clone(),
            deps.jobs.clone(),
            config.dispatch_concurrency,
            config.dispatch_timeout(),
            metrics.clone(),
        ));
        let ingress = Arc::new(ReportIngress::new(
            registry.clone(),
            locks.clone(),
            deps.jobs,
            metrics,
        ));

        Self {
            config: config.clone(),
            leader,
            registry,
            locks,
            scheduler,
            worker,
            ingress,
            outbox_rx: Mutex::new(Some(outbox_rx)),
            shutdown,
        }
    }

    pub fn leader(&self) -> Arc<LeaderCoordinator> {
        self.leader.clone()
    }

    pub fn registry(&self) -> Arc<AgentRegistry> {
        self.registry.clone()
    }

    pub fn locks(&self) -> Arc<DeviceLockManager> {
        self.locks.clone()
    }

    pub fn scheduler(&self) -> Arc<JobScheduler> {
        self.scheduler.clone()
    }

    pub fn ingress(&self) -> Arc<ReportIngress> {
        self.ingress.clone()
    }

    /// 运行直到关闭信号
    ///
    /// 等待租约期间的关闭返回 `Cancelled`；租约获取失败或启动失败返回错误。
    pub async fn run(&self) -> DispatchResult<RunOutcome> {
        let mut shutdown_rx = self.shutdown.subscribe().await;
        if self.leader.acquire(&mut shutdown_rx).await? == Acquisition::Cancelled {
            return Ok(RunOutcome::Cancelled);
        }

        if let Err(e) = self.registry.reload().await {
            error!("加载Agent失败: {}", e);
            self.leader.release().await;
            return Err(e);
        }

        let handles = self.spawn_tasks().await;
        info!("分发引擎已启动，共 {} 个后台任务", handles.len());

        self.shutdown.wait_for_shutdown().await;
        info!("正在停止分发引擎");

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("后台任务异常退出: {}", e);
            }
        }

        self.leader.release().await;
        info!("分发引擎已停止");
        Ok(RunOutcome::Completed)
    }

    async fn spawn_tasks(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        let config = &self.config;

        if let Some(rx) = self.outbox_rx.lock().await.take() {
            let worker = self.worker.clone();
            let shutdown_rx = self.shutdown.subscribe().await;
            handles.push(tokio::spawn(worker.run(rx, shutdown_rx)));
        }

        if config.keepalive_enabled() {
            let registry = self.registry.clone();
            let cycle = Arc::new(AgentCheckCycle::new(config.agent_reload_every));
            handles.push(tokio::spawn(run_periodic(
                "agent_keepalive",
                Duration::from_secs(config.agent_keepalive_freq_seconds),
                self.shutdown.subscribe().await,
                move || {
                    let registry = registry.clone();
                    let cycle = cycle.clone();
                    async move {
                        cycle.run(&registry).await;
                    }
                },
            )));
        } else {
            info!("Agent存活检查已关闭");
        }

        if config.sweeper_enabled() {
            let locks = self.locks.clone();
            let max_age = config.device_max_lock_age();
            handles.push(tokio::spawn(run_periodic(
                "device_unlock",
                Duration::from_secs(config.device_unlock_freq_seconds),
                self.shutdown.subscribe().await,
                move || {
                    let locks = locks.clone();
                    async move {
                        if let Err(e) = locks.sweep_expired(max_age).await {
                            warn!("设备锁清扫失败: {}", e);
                        }
                    }
                },
            )));
        } else {
            info!("设备锁清扫已关闭");
        }

        if config.snmp_enabled() {
            let scheduler = self.scheduler.clone();
            handles.push(tokio::spawn(run_periodic(
                "snmp_scheduler",
                Duration::from_secs(config.snmp_query_freq_seconds),
                self.shutdown.subscribe().await,
                move || {
                    let scheduler = scheduler.clone();
                    async move {
                        if let Err(e) = scheduler.run_snmp_tick(Utc::now()).await {
                            error!("SNMP调度周期失败: {}", e);
                        }
                    }
                },
            )));
        } else {
            info!("SNMP调度已关闭");
        }

        if config.ping_enabled() {
            let scheduler = self.scheduler.clone();
            handles.push(tokio::spawn(run_periodic(
                "ping_scheduler",
                Duration::from_secs(config.ping_query_freq_seconds),
                self.shutdown.subscribe().await,
                move || {
                    let scheduler = scheduler.clone();
                    async move {
                        if let Err(e) = scheduler.run_ping_tick(Utc::now()).await {
                            error!("ping调度周期失败: {}", e);
                        }
                    }
                },
            )));
        } else {
            info!("ping调度已关闭");
        }

        if self.leader.coordination_enabled() {
            handles.push(self.spawn_lease_watchdog().await);
        }

        handles
    }

    /// 定期确认租约仍然有效，丢失时以非零退出码关闭进程
    async fn spawn_lease_watchdog(&self) -> JoinHandle<()> {
        let period = if self.config.keepalive_enabled() {
            Duration::from_secs(self.config.agent_keepalive_freq_seconds)
        } else {
            DEFAULT_LEASE_CHECK_INTERVAL
        };
        let leader = self.leader.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(run_periodic(
            "lease_watchdog",
            period,
            self.shutdown.subscribe().await,
            move || {
                let leader = leader.clone();
                let shutdown = shutdown.clone();
                async move {
                    match leader.verify().await {
                        Ok(true) => {}
                        Ok(false) => {
                            error!("集群租约已丢失，停止调度");
                            shutdown.shutdown(ShutdownReason::LeaseLost).await;
                        }
                        Err(e) => {
                            error!("校验集群租约失败: {}", e);
                            shutdown.shutdown(ShutdownReason::LeaseLost).await;
                        }
                    }
                }
            },
        ))
    }
}
