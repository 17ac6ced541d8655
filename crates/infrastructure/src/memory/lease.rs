use std::collections::HashMap;

use async_trait::async_trait;
use pollmaster_core::{DispatchError, DispatchResult};
use pollmaster_domain::ports::LeaseService;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};

/// 进程内租约服务
///
/// 多个协调者共享同一个实例即可模拟集群内的竞争，`disconnect` 模拟持有者崩溃。
#[derive(Default)]
pub struct InMemoryLeaseService {
    holders: Mutex<HashMap<i64, String>>,
    released: Notify,
}

impl InMemoryLeaseService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn holder_of(&self, lease_id: i64) -> Option<String> {
        self.holders.lock().await.get(&lease_id).cloned()
    }

    /// 释放某个持有者的全部租约，相当于其数据库连接断开
    pub async fn disconnect(&self, holder: &str) {
        let mut holders = self.holders.lock().await;
        holders.retain(|_, h| h != holder);
        drop(holders);
        debug!(holder, "租约持有者断开");
        self.released.notify_waiters();
    }
}

#[async_trait]
impl LeaseService for InMemoryLeaseService {
    async fn acquire(&self, lease_id: i64, holder: &str) -> DispatchResult<()> {
        if lease_id < 0 {
            return Err(DispatchError::LeaseAcquisition(format!(
                "无效的租约ID: {lease_id}"
            )));
        }

        loop {
            // 先注册等待再检查，避免错过检查与等待之间的释放通知
            let notified = self.released.notified();
            {
                let mut holders = self.holders.lock().await;
                match holders.get(&lease_id) {
                    None => {
                        holders.insert(lease_id, holder.to_string());
                        info!(lease_id, holder, "获得集群租约");
                        return Ok(());
                    }
                    Some(current) if current == holder => return Ok(()),
                    Some(_) => {}
                }
            }
            notified.await;
        }
    }

    async fn is_held(&self, lease_id: i64, holder: &str) -> DispatchResult<bool> {
        Ok(self
            .holders
            .lock()
            .await
            .get(&lease_id)
            .is_some_and(|h| h == holder))
    }

    async fn release(&self, lease_id: i64, holder: &str) -> DispatchResult<()> {
        let mut holders = self.holders.lock().await;
        if holders.get(&lease_id).is_some_and(|h| h == holder) {
            holders.remove(&lease_id);
            drop(holders);
            self.released.notify_waiters();
        }
        Ok(())
    }
}
