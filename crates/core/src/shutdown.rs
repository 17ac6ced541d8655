use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

/// 关闭原因，决定进程的退出码
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// 收到中断/终止信号
    Signal,
    /// master在运行期间丢失了集群租约
    LeaseLost,
    /// 后台任务遇到无法恢复的错误
    Fatal(String),
}

impl ShutdownReason {
    /// 只有信号触发的关闭是正常退出
    pub fn is_clean(&self) -> bool {
        matches!(self, ShutdownReason::Signal)
    }
}

/// 优雅关闭管理器
///
/// 所有周期任务订阅同一个广播信号，在下一次唤醒时观察到并退出。
#[derive(Clone)]
pub struct ShutdownManager {
    shutdown_tx: Arc<RwLock<Option<broadcast::Sender<()>>>>,
    reason: Arc<RwLock<Option<ShutdownReason>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            shutdown_tx: Arc::new(RwLock::new(Some(shutdown_tx))),
            reason: Arc::new(RwLock::new(None)),
        }
    }

    /// 订阅关闭信号
    pub async fn subscribe(&self) -> broadcast::Receiver<()> {
        let shutdown_tx = self.shutdown_tx.read().await;
        if let Some(ref tx) = *shutdown_tx {
            tx.subscribe()
        } else {
            // 已经关闭，返回一个立即触发的接收器
            let (tx, rx) = broadcast::channel(1);
            let _ = tx.send(());
            rx
        }
    }

    /// 触发关闭，只有第一次调用的原因会被记录
    pub async fn shutdown(&self, reason: ShutdownReason) {
        {
            let mut current = self.reason.write().await;
            if let Some(existing) = current.as_ref() {
                debug!(?existing, ignored = ?reason, "关闭已经触发过");
                return;
            }
            if reason.is_clean() {
                info!("触发系统关闭");
            } else {
                warn!(?reason, "因异常触发系统关闭");
            }
            *current = Some(reason);
        }

        let mut shutdown_tx = self.shutdown_tx.write().await;
        if let Some(tx) = shutdown_tx.take() {
            debug!("发送关闭信号给 {} 个订阅者", tx.receiver_count());
            let _ = tx.send(());
        }
    }

    pub async fn is_shutdown(&self) -> bool {
        self.reason.read().await.is_some()
    }

    pub async fn reason(&self) -> Option<ShutdownReason> {
        self.reason.read().await.clone()
    }

    /// 等待关闭信号
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.subscribe().await;
        let _ = rx.recv().await;
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
