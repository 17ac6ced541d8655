use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pollmaster_core::{DispatchError, DispatchResult};
use pollmaster_domain::entities::DeviceLock;
use pollmaster_domain::repositories::DeviceLockStore;
use pollmaster_domain::value_objects::ReleaseOutcome;
use pollmaster_infrastructure::DispatchMetrics;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// 设备锁管理
///
/// 锁保存在存储中，对集群内所有进程可见；本地缓存只是存储状态的映射，
/// 由清扫任务修正。
pub struct DeviceLockManager {
    store: Arc<dyn DeviceLockStore>,
    cache: Mutex<HashMap<i64, DeviceLock>>,
    metrics: DispatchMetrics,
}

impl DeviceLockManager {
    pub fn new(store: Arc<dyn DeviceLockStore>, metrics: DispatchMetrics) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// 设备已被锁定时返回 `Ok(false)`
    pub async fn try_lock(&self, device_id: i64, token: Uuid) -> DispatchResult<bool> {
        let now = Utc::now();
        let locked = self.store.try_lock(device_id, token, now).await?;
        if locked {
            self.cache.lock().await.insert(
                device_id,
                DeviceLock {
                    token,
                    locked_at: now,
                },
            );
        } else {
            debug!(device_id, "设备已被锁定，跳过");
        }
        Ok(locked)
    }

    /// 无条件释放，可重复调用
    pub async fn unlock(&self, device_id: i64) -> DispatchResult<()> {
        self.store.unlock(device_id).await?;
        self.cache.lock().await.remove(&device_id);
        Ok(())
    }

    /// 只释放由 `token` 持有的锁，迟到的上报不会释放更新的锁
    pub async fn release_dispatch(
        &self,
        device_id: i64,
        token: Uuid,
    ) -> DispatchResult<ReleaseOutcome> {
        let outcome = self.store.release_if_token(device_id, token).await?;

        let mut cache = self.cache.lock().await;
        match outcome {
            ReleaseOutcome::Released | ReleaseOutcome::NotHeld => {
                cache.remove(&device_id);
            }
            ReleaseOutcome::HeldByOther => {
                if cache.get(&device_id).is_some_and(|lock| lock.token == token) {
                    cache.remove(&device_id);
                }
                debug!(device_id, %token, "设备锁已被其他分发持有，未释放");
            }
        }
        Ok(outcome)
    }

    /// 释放一次分发涉及的全部设备锁，单个失败只记录日志
    pub async fn release_all(&self, device_ids: &[i64], token: Uuid) -> usize {
        let mut released = 0;
        for &device_id in device_ids {
            match self.release_dispatch(device_id, token).await {
                Ok(ReleaseOutcome::Released) => released += 1,
                Ok(_) => {}
                Err(e) => warn!(device_id, "释放设备锁失败: {}", e),
            }
        }
        released
    }

    /// 强制释放超过 `max_age` 的锁，返回释放数量
    pub async fn sweep_expired(&self, max_age: Duration) -> DispatchResult<usize> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| DispatchError::Configuration(format!("无效的锁超时时间: {e}")))?;
        let now = Utc::now();
        let cutoff = now - max_age;

        let swept = self.store.sweep_expired(cutoff).await?;
        for device_id in &swept {
            warn!(device_id, "设备锁超过最大持有时间，已强制释放");
        }

        let mut cache = self.cache.lock().await;
        for device_id in &swept {
            cache.remove(device_id);
        }
        cache.retain(|_, lock| !lock.is_expired(max_age, now));
        drop(cache);

        if !swept.is_empty() {
            self.metrics.record_swept_locks(swept.len());
        }
        Ok(swept.len())
    }

    /// 本地缓存中的锁状态
    pub async fn cached_lock(&self, device_id: i64) -> Option<DeviceLock> {
        self.cache.lock().await.get(&device_id).copied()
    }

    pub async fn held_locks(&self) -> usize {
        self.cache.lock().await.len()
    }
}
