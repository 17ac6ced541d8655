use std::time::Duration;

use async_trait::async_trait;
use pollmaster_core::{DispatchError, DispatchResult};
use pollmaster_domain::ports::LeaseService;
use sqlx::{Connection, PgConnection};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// 基于PostgreSQL会话级advisory lock的集群租约
///
/// 租约绑定在一条专用连接上，进程崩溃导致连接断开时数据库自动释放租约，
/// 备用进程可以立即接管。
pub struct PostgresAdvisoryLease {
    url: String,
    retry_interval: Duration,
    conn: Mutex<Option<PgConnection>>,
}

impl PostgresAdvisoryLease {
    pub fn new(url: impl Into<String>, retry_interval: Duration) -> Self {
        Self {
            url: url.into(),
            retry_interval,
            conn: Mutex::new(None),
        }
    }

    /// advisory lock 的 bigint key 在 pg_locks 中拆分为 classid/objid 两部分
    fn split_key(lease_id: i64) -> (i64, i64) {
        (lease_id >> 32, lease_id & 0xFFFF_FFFF)
    }

    fn lease_error(context: &str, err: sqlx::Error) -> DispatchError {
        DispatchError::LeaseAcquisition(format!("{context}: {err}"))
    }
}

#[async_trait]
impl LeaseService for PostgresAdvisoryLease {
    async fn acquire(&self, lease_id: i64, holder: &str) -> DispatchResult<()> {
        if lease_id < 0 {
            return Err(DispatchError::LeaseAcquisition(format!(
                "无效的租约ID: {lease_id}"
            )));
        }

        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            let conn = PgConnection::connect(&self.url)
                .await
                .map_err(|e| Self::lease_error("连接租约数据库失败", e))?;
            *guard = Some(conn);
        }

        let mut attempts: u64 = 0;
        loop {
            let conn = guard
                .as_mut()
                .ok_or_else(|| DispatchError::Internal("租约连接丢失".to_string()))?;

            let granted: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
                .bind(lease_id)
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| Self::lease_error("尝试获取租约失败", e))?;

            if granted {
                info!(lease_id, holder, attempts, "获得集群租约");
                return Ok(());
            }

            attempts += 1;
            if attempts == 1 {
                info!(lease_id, holder, "集群租约被其他进程持有，进入等待");
            } else {
                debug!(lease_id, attempts, "集群租约仍被占用");
            }
            tokio::time::sleep(self.retry_interval).await;
        }
    }

    async fn is_held(&self, lease_id: i64, _holder: &str) -> DispatchResult<bool> {
        let mut guard = self.conn.lock().await;
        let Some(conn) = guard.as_mut() else {
            return Ok(false);
        };

        let (class_id, obj_id) = Self::split_key(lease_id);
        let held = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM pg_locks \
             WHERE locktype = 'advisory' AND granted AND pid = pg_backend_pid() \
             AND classid::bigint = $1 AND objid::bigint = $2 AND objsubid = 1)",
        )
        .bind(class_id)
        .bind(obj_id)
        .fetch_one(&mut *conn)
        .await;

        match held {
            Ok(held) => Ok(held),
            Err(e) => {
                // 连接已不可用，租约随之失效
                warn!(lease_id, error = %e, "检查集群租约失败");
                *guard = None;
                Ok(false)
            }
        }
    }

    async fn release(&self, lease_id: i64, holder: &str) -> DispatchResult<()> {
        let mut guard = self.conn.lock().await;
        let Some(mut conn) = guard.take() else {
            return Ok(());
        };

        let unlocked = sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1)")
            .bind(lease_id)
            .fetch_one(&mut conn)
            .await;

        match unlocked {
            Ok(true) => info!(lease_id, holder, "已释放集群租约"),
            Ok(false) => debug!(lease_id, "释放时未持有集群租约"),
            Err(e) => warn!(lease_id, error = %e, "释放集群租约失败，关闭连接以强制释放"),
        }

        // 关闭连接保证会话级锁一并释放
        if let Err(e) = conn.close().await {
            debug!(error = %e, "关闭租约连接失败");
        }
        Ok(())
    }
}
