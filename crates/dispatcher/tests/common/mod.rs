#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pollmaster_core::config::DispatcherConfig;
use pollmaster_core::{DispatchError, DispatchResult};
use pollmaster_domain::entities::{Agent, Device, DeviceInput, DispatchRequest};
use pollmaster_domain::ports::{AgentClient, AgentHealth};
use pollmaster_domain::repositories::DeviceRepository;
use pollmaster_dispatcher::{
    AgentRegistry, DeviceLockManager, DispatchOutbox, JobScheduler, RegistrySettings,
    ReportIngress, SchedulerSettings,
};
use pollmaster_infrastructure::{DispatchMetrics, InMemoryStore};
use tokio::sync::mpsc;

/// 可配置的Agent客户端，记录所有分发请求
#[derive(Default)]
pub struct StubAgentClient {
    loads: Mutex<HashMap<i64, f64>>,
    down: Mutex<HashSet<i64>>,
    dispatched: Mutex<Vec<DispatchRequest>>,
}

impl StubAgentClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_load(&self, agent_id: i64, load: f64) {
        self.loads.lock().unwrap().insert(agent_id, load);
    }

    pub fn set_down(&self, agent_id: i64, down: bool) {
        let mut set = self.down.lock().unwrap();
        if down {
            set.insert(agent_id);
        } else {
            set.remove(&agent_id);
        }
    }

    pub fn dispatched(&self) -> Vec<DispatchRequest> {
        self.dispatched.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentClient for StubAgentClient {
    async fn check(&self, agent: &Agent) -> DispatchResult<AgentHealth> {
        if self.down.lock().unwrap().contains(&agent.id) {
            return Err(DispatchError::AgentUnreachable {
                agent: agent.address(),
                message: "connection refused".to_string(),
            });
        }
        Ok(AgentHealth {
            load: self.loads.lock().unwrap().get(&agent.id).copied(),
        })
    }

    async fn dispatch(&self, request: &DispatchRequest) -> DispatchResult<()> {
        if self.down.lock().unwrap().contains(&request.agent.id) {
            return Err(DispatchError::AgentUnreachable {
                agent: request.agent.address(),
                message: "connection refused".to_string(),
            });
        }
        self.dispatched.lock().unwrap().push(request.clone());
        Ok(())
    }
}

pub fn agents(count: i64) -> Vec<Agent> {
    (1..=count)
        .map(|id| Agent::new(id, format!("10.0.0.{id}"), 8000))
        .collect()
}

pub async fn seed_devices(store: &InMemoryStore, count: usize) -> Vec<Device> {
    let mut devices = Vec::new();
    for i in 0..count {
        let input = DeviceInput::new(format!("device-{i}"), format!("10.1.0.{}", i + 1));
        devices.push(store.create(&input).await.unwrap());
    }
    devices
}

/// 基于内存存储组装的调度组件
pub struct Harness {
    pub store: InMemoryStore,
    pub client: Arc<StubAgentClient>,
    pub registry: Arc<AgentRegistry>,
    pub locks: Arc<DeviceLockManager>,
    pub scheduler: JobScheduler,
    pub ingress: ReportIngress,
    pub outbox_rx: mpsc::Receiver<DispatchRequest>,
}

impl Harness {
    pub async fn new(agent_list: &[Agent], config: DispatcherConfig) -> Self {
        let store = InMemoryStore::new();
        for agent in agent_list {
            store.add_agent(agent.clone()).await;
        }

        let client = Arc::new(StubAgentClient::new());
        let metrics = DispatchMetrics::new();
        let registry = Arc::new(AgentRegistry::new(
            Arc::new(store.clone()),
            client.clone(),
            RegistrySettings::from(&config),
            metrics.clone(),
        ));
        registry.reload().await.unwrap();

        let locks = Arc::new(DeviceLockManager::new(Arc::new(store.clone()), metrics.clone()));
        let (outbox, outbox_rx) = DispatchOutbox::channel(config.outbox_capacity, metrics.clone());
        let scheduler = JobScheduler::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            registry.clone(),
            locks.clone(),
            outbox,
            SchedulerSettings::new(&config, vec!["dispatcher-1:8080".to_string()]),
            metrics.clone(),
        );
        let ingress = ReportIngress::new(
            registry.clone(),
            locks.clone(),
            Arc::new(store.clone()),
            metrics,
        );

        Self {
            store,
            client,
            registry,
            locks,
            scheduler,
            ingress,
            outbox_rx,
        }
    }

    /// 取出队列中的全部分发请求
    pub fn drain_outbox(&mut self) -> Vec<DispatchRequest> {
        let mut requests = Vec::new();
        while let Ok(request) = self.outbox_rx.try_recv() {
            requests.push(request);
        }
        requests
    }
}
