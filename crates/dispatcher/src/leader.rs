use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pollmaster_core::{DispatchError, DispatchResult};
use pollmaster_domain::ports::LeaseService;
use pollmaster_infrastructure::DispatchMetrics;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// 当前进程在集群中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Master,
    Slave,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Slave => "slave",
        }
    }
}

/// 等待租约的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    Acquired,
    /// 等待期间收到关闭信号
    Cancelled,
}

/// 主节点选举
///
/// 集群中持有同一租约的进程只有一个，它负责所有调度。租约id为0时不做协调，
/// 进程启动即为主节点。
pub struct LeaderCoordinator {
    lease: Option<Arc<dyn LeaseService>>,
    lease_id: i64,
    holder: String,
    is_master: AtomicBool,
    metrics: DispatchMetrics,
}

impl LeaderCoordinator {
    pub fn new(
        lease: Arc<dyn LeaseService>,
        lease_id: i64,
        holder: impl Into<String>,
        metrics: DispatchMetrics,
    ) -> Self {
        if lease_id == 0 {
            return Self::standalone(holder, metrics);
        }
        metrics.set_master(false);
        Self {
            lease: Some(lease),
            lease_id,
            holder: holder.into(),
            is_master: AtomicBool::new(false),
            metrics,
        }
    }

    /// 单实例部署
    pub fn standalone(holder: impl Into<String>, metrics: DispatchMetrics) -> Self {
        metrics.set_master(true);
        Self {
            lease: None,
            lease_id: 0,
            holder: holder.into(),
            is_master: AtomicBool::new(true),
            metrics,
        }
    }

    pub fn coordination_enabled(&self) -> bool {
        self.lease.is_some()
    }

    pub fn lease_id(&self) -> i64 {
        self.lease_id
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn role(&self) -> Role {
        if self.is_master.load(Ordering::SeqCst) {
            Role::Master
        } else {
            Role::Slave
        }
    }

    pub fn is_master(&self) -> bool {
        self.role() == Role::Master
    }

    /// 阻塞直到获得租约或收到关闭信号
    pub async fn acquire(
        &self,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> DispatchResult<Acquisition> {
        let Some(lease) = &self.lease else {
            self.set_master(true);
            return Ok(Acquisition::Acquired);
        };

        if self.lease_id < 0 {
            return Err(DispatchError::LeaseAcquisition(format!(
                "无效的租约ID: {}",
                self.lease_id
            )));
        }

        info!(
            lease_id = self.lease_id,
            holder = %self.holder,
            "以从节点身份等待集群租约"
        );

        tokio::select! {
            result = lease.acquire(self.lease_id, &self.holder) => {
                result?;
                self.set_master(true);
                info!(lease_id = self.lease_id, "已成为主节点");
                Ok(Acquisition::Acquired)
            }
            _ = shutdown_rx.recv() => {
                info!("等待租约期间收到关闭信号");
                Ok(Acquisition::Cancelled)
            }
        }
    }

    /// 确认租约仍由本进程持有，丢失时降级为从节点
    pub async fn verify(&self) -> DispatchResult<bool> {
        let Some(lease) = &self.lease else {
            return Ok(true);
        };
        if !self.is_master() {
            return Ok(false);
        }

        let held = lease.is_held(self.lease_id, &self.holder).await?;
        if !held {
            warn!(lease_id = self.lease_id, "集群租约已丢失，降级为从节点");
            self.set_master(false);
        }
        Ok(held)
    }

    /// 立即释放租约，失败只记录日志
    pub async fn release(&self) {
        let Some(lease) = &self.lease else {
            return;
        };
        if !self.is_master() {
            return;
        }

        match lease.release(self.lease_id, &self.holder).await {
            Ok(()) => info!(lease_id = self.lease_id, "已释放集群租约"),
            Err(e) => warn!(lease_id = self.lease_id, "释放集群租约失败: {}", e),
        }
        self.set_master(false);
    }

    fn set_master(&self, is_master: bool) {
        self.is_master.store(is_master, Ordering::SeqCst);
        self.metrics.set_master(is_master);
    }
}
