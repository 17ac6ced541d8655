use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::agent_registry::{AgentRegistry, CheckSummary};

/// 计数器，每 `every` 次返回一次 `true`
#[derive(Debug)]
pub struct TickCounter {
    every: u64,
    count: AtomicU64,
}

impl TickCounter {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            count: AtomicU64::new(0),
        }
    }

    pub fn tick(&self) -> bool {
        let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        count % self.every == 0
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

/// 存活检查周期的下一步
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStep {
    Check,
    ReloadThenCheck,
}

/// Agent存活检查周期
///
/// 每 `reload_every` 次检查前先从存储重新加载Agent。
#[derive(Debug)]
pub struct AgentCheckCycle {
    counter: TickCounter,
}

impl AgentCheckCycle {
    pub fn new(reload_every: u64) -> Self {
        Self {
            counter: TickCounter::new(reload_every),
        }
    }

    pub fn next_step(&self) -> CycleStep {
        if self.counter.tick() {
            CycleStep::ReloadThenCheck
        } else {
            CycleStep::Check
        }
    }

    pub async fn run(&self, registry: &AgentRegistry) -> CheckSummary {
        if self.next_step() == CycleStep::ReloadThenCheck {
            if let Err(e) = registry.reload().await {
                warn!("重新加载Agent失败，沿用当前集合: {}", e);
            }
        }
        registry.check_agents().await
    }
}

/// 按固定周期执行任务直到收到关闭信号
///
/// 任务执行期间收到的关闭信号在本轮结束后生效，不会开始新的一轮。
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
    mut task: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(task = name, period_secs = period.as_secs(), "周期任务已启动");

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                info!(task = name, "周期任务收到关闭信号");
                break;
            }
            _ = interval.tick() => task().await,
        }
    }
}
