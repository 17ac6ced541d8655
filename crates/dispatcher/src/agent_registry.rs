use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use pollmaster_core::config::DispatcherConfig;
use pollmaster_core::DispatchResult;
use pollmaster_domain::entities::{Agent, AgentSnapshot, AgentStatus, Device};
use pollmaster_domain::ports::AgentClient;
use pollmaster_domain::repositories::AgentRepository;
use pollmaster_domain::value_objects::LoadWindow;
use pollmaster_infrastructure::DispatchMetrics;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 注册表的运行参数
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub load_window: Duration,
    pub check_timeout: Duration,
    pub max_load_delta: f64,
}

impl From<&DispatcherConfig> for RegistrySettings {
    fn from(config: &DispatcherConfig) -> Self {
        Self {
            load_window: config.load_avg_window(),
            check_timeout: config.agent_check_timeout(),
            max_load_delta: config.max_load_delta,
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self::from(&DispatcherConfig::default())
    }
}

/// 放置结果
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub agent: Agent,
    /// 绑定发生变化，需要在分发前持久化
    pub reassigned: bool,
    /// 负载迁移前绑定的Agent
    pub unstuck_from: Option<i64>,
}

/// 一轮存活检查的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub alive: usize,
    pub unreachable: usize,
}

#[derive(Debug)]
struct AgentState {
    agent: Agent,
    status: AgentStatus,
    load: LoadWindow,
    last_seen: Option<DateTime<Utc>>,
}

impl AgentState {
    fn new(agent: Agent, window: Duration) -> Self {
        Self {
            agent,
            status: AgentStatus::Alive,
            load: LoadWindow::new(window),
            last_seen: None,
        }
    }

    fn is_alive(&self) -> bool {
        self.status == AgentStatus::Alive
    }
}

/// Agent注册表
///
/// 跟踪已知Agent的存活状态和滑动窗口负载，并为设备选择Agent。
pub struct AgentRegistry {
    repo: Arc<dyn AgentRepository>,
    client: Arc<dyn AgentClient>,
    agents: RwLock<BTreeMap<i64, AgentState>>,
    settings: RegistrySettings,
    metrics: DispatchMetrics,
}

impl AgentRegistry {
    pub fn new(
        repo: Arc<dyn AgentRepository>,
        client: Arc<dyn AgentClient>,
        settings: RegistrySettings,
        metrics: DispatchMetrics,
    ) -> Self {
        Self {
            repo,
            client,
            agents: RwLock::new(BTreeMap::new()),
            settings,
            metrics,
        }
    }

    /// 从存储重新加载Agent集合
    ///
    /// 成员整体替换，仍然存在的Agent保留负载与存活状态。
    pub async fn reload(&self) -> DispatchResult<usize> {
        let loaded = self.repo.list_active().await?;

        let mut agents = self.agents.write().await;
        let mut previous = std::mem::take(&mut *agents);
        for agent in loaded {
            let state = match previous.remove(&agent.id) {
                Some(mut state) => {
                    state.agent = agent;
                    state
                }
                None => {
                    debug!(agent_id = agent.id, address = %agent.address(), "新增Agent");
                    AgentState::new(agent, self.settings.load_window)
                }
            };
            agents.insert(state.agent.id, state);
        }

        for evicted in previous.keys() {
            info!(agent_id = evicted, "Agent已从注册表移除");
        }

        let count = agents.len();
        drop(agents);
        self.publish_counts().await;
        info!("已加载 {} 个Agent", count);
        Ok(count)
    }

    /// 并发检查所有Agent，超时或出错视为不可达
    pub async fn check_agents(&self) -> CheckSummary {
        let targets: Vec<Agent> = {
            let agents = self.agents.read().await;
            agents.values().map(|s| s.agent.clone()).collect()
        };

        let timeout = self.settings.check_timeout;
        let probes = targets.into_iter().map(|agent| {
            let client = self.client.clone();
            async move {
                let result = tokio::time::timeout(timeout, client.check(&agent)).await;
                (agent.id, result)
            }
        });
        let results = join_all(probes).await;

        let now = Utc::now();
        let mut agents = self.agents.write().await;
        for (agent_id, result) in results {
            // 检查期间可能被重新加载移除
            let Some(state) = agents.get_mut(&agent_id) else {
                continue;
            };

            match result {
                Ok(Ok(health)) => {
                    if !state.is_alive() {
                        info!(agent_id, "Agent恢复可达");
                    }
                    state.status = AgentStatus::Alive;
                    state.last_seen = Some(now);
                    if let Some(load) = health.load {
                        state.load.record(now, load);
                    }
                }
                Ok(Err(e)) => {
                    if state.is_alive() {
                        warn!(agent_id, "Agent检查失败，标记为不可达: {}", e);
                    }
                    state.status = AgentStatus::Unreachable;
                }
                Err(_) => {
                    if state.is_alive() {
                        warn!(agent_id, "Agent检查超时，标记为不可达");
                    }
                    state.status = AgentStatus::Unreachable;
                }
            }
        }

        let summary = summarize(&agents);
        drop(agents);
        self.metrics
            .set_agent_counts(summary.alive, summary.unreachable);
        summary
    }

    /// 为设备选择Agent
    ///
    /// 已绑定且存活的Agent优先，只有绑定Agent比最空闲的Agent负载高出
    /// `max_load_delta` 以上时才迁移。负载相同时选id最小的。
    pub async fn select_agent(&self, device: &Device, now: DateTime<Utc>) -> Option<Placement> {
        let mut agents = self.agents.write().await;

        let mut best: Option<(f64, i64)> = None;
        let mut bound_load: Option<f64> = None;
        for state in agents.values_mut() {
            if !state.is_alive() {
                continue;
            }
            let load = state.agent.weighted_load(state.load.average(now));
            if device.agent_id == Some(state.agent.id) {
                bound_load = Some(load);
            }
            // BTreeMap按id升序遍历，严格小于即可保证平局时取最小id
            if best.map_or(true, |(best_load, _)| load < best_load) {
                best = Some((load, state.agent.id));
            }
        }

        let (best_load, best_id) = best?;
        let agent_of = |id: i64| agents.get(&id).map(|s| s.agent.clone());

        if let (Some(bound_id), Some(bound_load)) = (device.agent_id, bound_load) {
            if bound_load - best_load <= self.settings.max_load_delta {
                return Some(Placement {
                    agent: agent_of(bound_id)?,
                    reassigned: false,
                    unstuck_from: None,
                });
            }
            debug!(
                device_id = device.id,
                from = bound_id,
                to = best_id,
                bound_load,
                best_load,
                "负载差超过阈值，迁移设备"
            );
            return Some(Placement {
                agent: agent_of(best_id)?,
                reassigned: true,
                unstuck_from: Some(bound_id),
            });
        }

        Some(Placement {
            agent: agent_of(best_id)?,
            reassigned: device.agent_id != Some(best_id),
            unstuck_from: None,
        })
    }

    /// 记录上报的负载样本，未知Agent返回 `false`
    pub async fn record_load(&self, agent_id: i64, sample: f64, at: DateTime<Utc>) -> bool {
        let mut agents = self.agents.write().await;
        let Some(state) = agents.get_mut(&agent_id) else {
            return false;
        };
        state.load.record(at, sample);
        state.last_seen = Some(at);
        if !state.is_alive() {
            info!(agent_id, "收到上报，Agent恢复可达");
            state.status = AgentStatus::Alive;
        }
        true
    }

    pub async fn mark_unreachable(&self, agent_id: i64) {
        let mut agents = self.agents.write().await;
        if let Some(state) = agents.get_mut(&agent_id) {
            if state.is_alive() {
                warn!(agent_id, "Agent标记为不可达");
            }
            state.status = AgentStatus::Unreachable;
        }
        let summary = summarize(&agents);
        drop(agents);
        self.metrics
            .set_agent_counts(summary.alive, summary.unreachable);
    }

    pub async fn snapshot(&self) -> Vec<AgentSnapshot> {
        let now = Utc::now();
        let mut agents = self.agents.write().await;
        agents
            .values_mut()
            .map(|state| AgentSnapshot {
                agent: state.agent.clone(),
                status: state.status,
                load: state.load.average(now),
                last_seen: state.last_seen,
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }

    pub async fn alive_count(&self) -> usize {
        self.agents.read().await.values().filter(|s| s.is_alive()).count()
    }

    async fn publish_counts(&self) {
        let summary = summarize(&*self.agents.read().await);
        self.metrics
            .set_agent_counts(summary.alive, summary.unreachable);
    }
}

fn summarize(agents: &BTreeMap<i64, AgentState>) -> CheckSummary {
    let alive = agents.values().filter(|s| s.is_alive()).count();
    CheckSummary {
        alive,
        unreachable: agents.len() - alive,
    }
}
