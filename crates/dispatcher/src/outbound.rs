use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pollmaster_domain::entities::DispatchRequest;
use pollmaster_domain::ports::AgentClient;
use pollmaster_domain::repositories::JobRepository;
use pollmaster_infrastructure::DispatchMetrics;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tracing::{debug, info, warn};

use crate::agent_registry::AgentRegistry;
use crate::device_lock::DeviceLockManager;

/// 调度器到出站worker的通道发送端
///
/// 调度周期从不等待网络，投递失败时把请求原样退回给调用方。
#[derive(Clone)]
pub struct DispatchOutbox {
    tx: mpsc::Sender<DispatchRequest>,
    metrics: DispatchMetrics,
}

impl DispatchOutbox {
    pub fn channel(
        capacity: usize,
        metrics: DispatchMetrics,
    ) -> (Self, mpsc::Receiver<DispatchRequest>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, metrics }, rx)
    }

    pub fn submit(&self, request: DispatchRequest) -> Result<(), DispatchRequest> {
        match self.tx.try_send(request) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(request)) => {
                warn!(dispatch_id = %request.dispatch_id, "分发队列已满");
                self.metrics.record_outbox_full();
                Err(request)
            }
            Err(mpsc::error::TrySendError::Closed(request)) => {
                warn!(dispatch_id = %request.dispatch_id, "分发队列已关闭");
                Err(request)
            }
        }
    }
}

/// 出站分发worker
///
/// 并发数由信号量限制，每个请求有独立的超时。
pub struct DispatchWorker {
    client: Arc<dyn AgentClient>,
    registry: Arc<AgentRegistry>,
    locks: Arc<DeviceLockManager>,
    jobs: Arc<dyn JobRepository>,
    permits: Arc<Semaphore>,
    concurrency: usize,
    timeout: Duration,
    metrics: DispatchMetrics,
}

impl DispatchWorker {
    pub fn new(
        client: Arc<dyn AgentClient>,
        registry: Arc<AgentRegistry>,
        locks: Arc<DeviceLockManager>,
        jobs: Arc<dyn JobRepository>,
        concurrency: usize,
        timeout: Duration,
        metrics: DispatchMetrics,
    ) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            client,
            registry,
            locks,
            jobs,
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            timeout,
            metrics,
        }
    }

    /// 消费分发队列直到关闭信号或通道关闭
    pub async fn run(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<DispatchRequest>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("出站分发worker已启动");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("出站分发worker收到关闭信号");
                    break;
                }
                request = rx.recv() => {
                    let Some(request) = request else {
                        debug!("分发队列已关闭");
                        break;
                    };
                    let Ok(permit) = self.permits.clone().acquire_owned().await else {
                        break;
                    };
                    let worker = self.clone();
                    tokio::spawn(async move {
                        worker.deliver(request).await;
                        drop(permit);
                    });
                }
            }
        }

        // 未发出的请求立即释放锁，不必等清扫任务
        rx.close();
        let mut abandoned = 0;
        while let Ok(request) = rx.try_recv() {
            self.locks
                .release_all(&request.device_ids(), request.dispatch_id)
                .await;
            abandoned += 1;
        }
        if abandoned > 0 {
            info!("关闭时放弃 {} 个未发出的分发请求", abandoned);
        }

        // 等待进行中的请求结束，每个请求都受超时约束
        let _ = self.permits.acquire_many(self.concurrency as u32).await;
        info!("出站分发worker已停止");
    }

    /// 发送单个请求，成功返回 `true`
    ///
    /// 成功时推进目标设备的下次到期时间，锁保留到上报到达。
    /// 失败时立即释放锁并把Agent标记为不可达，任务保持到期等待下一轮。
    pub async fn deliver(&self, request: DispatchRequest) -> bool {
        let device_ids = request.device_ids();
        let result = tokio::time::timeout(self.timeout, self.client.dispatch(&request)).await;

        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("请求超时（{}秒）", self.timeout.as_secs())),
        };

        match failure {
            None => {
                let now = Utc::now();
                for &device_id in &device_ids {
                    if let Err(e) = self
                        .jobs
                        .mark_dispatched(request.kind, device_id, now)
                        .await
                    {
                        warn!(device_id, "更新下次到期时间失败: {}", e);
                    }
                }
                debug!(
                    dispatch_id = %request.dispatch_id,
                    agent_id = request.agent.id,
                    kind = %request.kind,
                    targets = device_ids.len(),
                    "分发成功"
                );
                self.metrics.record_dispatch_result(request.kind, true);
                true
            }
            Some(message) => {
                warn!(
                    dispatch_id = %request.dispatch_id,
                    agent = %request.agent.address(),
                    kind = %request.kind,
                    "分发失败: {}",
                    message
                );
                self.locks
                    .release_all(&device_ids, request.dispatch_id)
                    .await;
                self.registry.mark_unreachable(request.agent.id).await;
                self.metrics.record_dispatch_result(request.kind, false);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_registry::RegistrySettings;
    use crate::test_utils::fixtures::store_with_devices;
    use crate::test_utils::mocks::MockAgentClient;
    use pollmaster_core::DispatchError;
    use pollmaster_domain::entities::{Agent, AgentStatus, JobKind};
    use uuid::Uuid;

    fn build_worker(
        store: &pollmaster_infrastructure::InMemoryStore,
        client: MockAgentClient,
    ) -> (DispatchWorker, Arc<AgentRegistry>, Arc<DeviceLockManager>) {
        let client: Arc<dyn AgentClient> = Arc::new(client);
        let metrics = DispatchMetrics::new();
        let registry = Arc::new(AgentRegistry::new(
            Arc::new(store.clone()),
            client.clone(),
            RegistrySettings::default(),
            metrics.clone(),
        ));
        let locks = Arc::new(DeviceLockManager::new(Arc::new(store.clone()), metrics.clone()));
        let worker = DispatchWorker::new(
            client,
            registry.clone(),
            locks.clone(),
            Arc::new(store.clone()),
            4,
            Duration::from_secs(1),
            metrics,
        );
        (worker, registry, locks)
    }

    #[tokio::test]
    async fn test_deliver_success_advances_due_time_and_keeps_lock() {
        let agent = Agent::new(1, "10.0.0.1", 8000);
        let (store, devices) = store_with_devices(&[agent.clone()], 1).await;
        let device = &devices[0];

        let mut client = MockAgentClient::new();
        client.expect_dispatch().times(1).returning(|_| Ok(()));
        let (worker, registry, locks) = build_worker(&store, client);
        registry.reload().await.unwrap();

        let token = Uuid::new_v4();
        assert!(locks.try_lock(device.id, token).await.unwrap());

        let request = DispatchRequest {
            dispatch_id: token,
            kind: JobKind::Snmp,
            agent,
            targets: vec![device.to_target(JobKind::Snmp)],
            report_hosts: vec![],
        };
        assert!(worker.deliver(request).await);

        let stored = store.device(device.id).await.unwrap();
        assert!(stored.next_snmp_at.unwrap() > Utc::now());
        assert_eq!(store.lock_of(device.id).await.unwrap().token, token);
    }

    #[tokio::test]
    async fn test_deliver_failure_releases_lock_and_marks_unreachable() {
        let agent = Agent::new(1, "10.0.0.1", 8000);
        let (store, devices) = store_with_devices(&[agent.clone()], 1).await;
        let device = &devices[0];

        let mut client = MockAgentClient::new();
        client.expect_dispatch().times(1).returning(|_| {
            Err(DispatchError::AgentUnreachable {
                agent: "10.0.0.1:8000".to_string(),
                message: "connection refused".to_string(),
            })
        });
        let (worker, registry, locks) = build_worker(&store, client);
        registry.reload().await.unwrap();

        let token = Uuid::new_v4();
        assert!(locks.try_lock(device.id, token).await.unwrap());

        let request = DispatchRequest {
            dispatch_id: token,
            kind: JobKind::Snmp,
            agent,
            targets: vec![device.to_target(JobKind::Snmp)],
            report_hosts: vec![],
        };
        assert!(!worker.deliver(request).await);

        assert!(store.lock_of(device.id).await.is_none());
        assert!(store.device(device.id).await.unwrap().next_snmp_at.is_none());
        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot[0].status, AgentStatus::Unreachable);
    }

    #[tokio::test]
    async fn test_outbox_rejects_when_full() {
        let (outbox, _rx) = DispatchOutbox::channel(1, DispatchMetrics::new());
        let request = DispatchRequest {
            dispatch_id: Uuid::new_v4(),
            kind: JobKind::Ping,
            agent: Agent::new(1, "10.0.0.1", 8000),
            targets: vec![],
            report_hosts: vec![],
        };

        assert!(outbox.submit(request.clone()).is_ok());
        let rejected = outbox.submit(request.clone()).unwrap_err();
        assert_eq!(rejected.dispatch_id, request.dispatch_id);
    }
}
