use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pollmaster_core::DispatchResult;
use pollmaster_domain::{repositories::DeviceLockStore, value_objects::ReleaseOutcome};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// 设备锁保存在 `devices.is_polling` 等列上，对所有进程可见
pub struct PostgresDeviceLockStore {
    pool: PgPool,
}

impl PostgresDeviceLockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub const TRY_LOCK_SQL: &'static str = "UPDATE devices \
         SET is_polling = TRUE, polling_token = $2, polling_since = $3 \
         WHERE id = $1 AND NOT is_polling";

    pub const UNLOCK_SQL: &'static str = "UPDATE devices \
         SET is_polling = FALSE, polling_token = NULL, polling_since = NULL \
         WHERE id = $1";

    pub const RELEASE_IF_TOKEN_SQL: &'static str = "UPDATE devices \
         SET is_polling = FALSE, polling_token = NULL, polling_since = NULL \
         WHERE id = $1 AND is_polling AND polling_token = $2";

    pub const SWEEP_SQL: &'static str = "UPDATE devices \
         SET is_polling = FALSE, polling_token = NULL, polling_since = NULL \
         WHERE is_polling AND polling_since < $1 \
         RETURNING id";
}

#[async_trait]
impl DeviceLockStore for PostgresDeviceLockStore {
    async fn try_lock(
        &self,
        device_id: i64,
        token: Uuid,
        at: DateTime<Utc>,
    ) -> DispatchResult<bool> {
        let result = sqlx::query(Self::TRY_LOCK_SQL)
            .bind(device_id)
            .bind(token)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn unlock(&self, device_id: i64) -> DispatchResult<()> {
        sqlx::query(Self::UNLOCK_SQL)
            .bind(device_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn release_if_token(
        &self,
        device_id: i64,
        token: Uuid,
    ) -> DispatchResult<ReleaseOutcome> {
        let result = sqlx::query(Self::RELEASE_IF_TOKEN_SQL)
            .bind(device_id)
            .bind(token)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 1 {
            return Ok(ReleaseOutcome::Released);
        }

        let row = sqlx::query("SELECT is_polling FROM devices WHERE id = $1")
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;

        let held = match row {
            Some(row) => row.try_get::<bool, _>("is_polling")?,
            None => false,
        };

        Ok(if held {
            ReleaseOutcome::HeldByOther
        } else {
            ReleaseOutcome::NotHeld
        })
    }

    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> DispatchResult<Vec<i64>> {
        let rows = sqlx::query(Self::SWEEP_SQL)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<i64, _>("id").map_err(Into::into))
            .collect()
    }
}
