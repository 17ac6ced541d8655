use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pollmaster_core::{DispatchError, DispatchResult};
use pollmaster_domain::{
    entities::{Device, DeviceInput, DeviceLock},
    repositories::DeviceRepository,
};
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

/// 设备查询使用的列
pub(crate) const DEVICE_COLUMNS: &str = "id, hostname, ip_address, agent_id, snmp_enabled, \
     snmp_frequency_seconds, ping_enabled, ping_frequency_seconds, snmp_params, next_snmp_at, \
     next_ping_at, is_polling, polling_token, polling_since, created_at, updated_at";

/// 将数据库行转换为设备
pub(crate) fn row_to_device(row: &sqlx::postgres::PgRow) -> DispatchResult<Device> {
    let is_polling: bool = row.try_get("is_polling")?;
    let token: Option<Uuid> = row.try_get("polling_token")?;
    let since: Option<DateTime<Utc>> = row.try_get("polling_since")?;

    let lock = match (is_polling, token, since) {
        (true, Some(token), Some(locked_at)) => Some(DeviceLock { token, locked_at }),
        _ => None,
    };

    Ok(Device {
        id: row.try_get("id")?,
        hostname: row.try_get("hostname")?,
        ip_address: row.try_get("ip_address")?,
        agent_id: row.try_get("agent_id")?,
        snmp_enabled: row.try_get("snmp_enabled")?,
        snmp_frequency_seconds: row.try_get("snmp_frequency_seconds")?,
        ping_enabled: row.try_get("ping_enabled")?,
        ping_frequency_seconds: row.try_get("ping_frequency_seconds")?,
        snmp_params: row.try_get("snmp_params")?,
        next_snmp_at: row.try_get("next_snmp_at")?,
        next_ping_at: row.try_get("next_ping_at")?,
        lock,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// 唯一约束与外键冲突转换为 `Conflict`
fn write_error(err: sqlx::Error, hostname: &str) -> DispatchError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return DispatchError::Conflict(format!("设备hostname已存在: {hostname}"));
        }
        if db_err.is_foreign_key_violation() {
            return DispatchError::Conflict(format!("设备 {hostname} 绑定的Agent不存在"));
        }
    }
    DispatchError::Database(err)
}

/// PostgreSQL 设备仓储实现
pub struct PostgresDeviceRepository {
    pool: PgPool,
}

impl PostgresDeviceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceRepository for PostgresDeviceRepository {
    async fn list(&self) -> DispatchResult<Vec<Device>> {
        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices ORDER BY id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_device).collect()
    }

    async fn get(&self, id: i64) -> DispatchResult<Option<Device>> {
        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_device).transpose()
    }

    async fn create(&self, input: &DeviceInput) -> DispatchResult<Device> {
        let sql = format!(
            r#"
            INSERT INTO devices (hostname, ip_address, agent_id, snmp_enabled, snmp_frequency_seconds,
                                 ping_enabled, ping_frequency_seconds, snmp_params)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {DEVICE_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(&input.hostname)
            .bind(&input.ip_address)
            .bind(input.agent_id)
            .bind(input.snmp_enabled)
            .bind(input.snmp_frequency_seconds)
            .bind(input.ping_enabled)
            .bind(input.ping_frequency_seconds)
            .bind(&input.snmp_params)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| write_error(e, &input.hostname))?;

        let device = row_to_device(&row)?;
        debug!("创建设备成功: {} (ID: {})", device.hostname, device.id);
        Ok(device)
    }

    async fn update(&self, id: i64, input: &DeviceInput) -> DispatchResult<Device> {
        let sql = format!(
            r#"
            UPDATE devices
            SET hostname = $2, ip_address = $3, agent_id = $4, snmp_enabled = $5,
                snmp_frequency_seconds = $6, ping_enabled = $7, ping_frequency_seconds = $8,
                snmp_params = $9, updated_at = NOW()
            WHERE id = $1
            RETURNING {DEVICE_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(&input.hostname)
            .bind(&input.ip_address)
            .bind(input.agent_id)
            .bind(input.snmp_enabled)
            .bind(input.snmp_frequency_seconds)
            .bind(input.ping_enabled)
            .bind(input.ping_frequency_seconds)
            .bind(&input.snmp_params)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| write_error(e, &input.hostname))?;

        match row {
            Some(row) => row_to_device(&row),
            None => Err(DispatchError::DeviceNotFound { id }),
        }
    }

    async fn upsert(&self, input: &DeviceInput) -> DispatchResult<Device> {
        let sql = format!(
            r#"
            INSERT INTO devices (hostname, ip_address, agent_id, snmp_enabled, snmp_frequency_seconds,
                                 ping_enabled, ping_frequency_seconds, snmp_params)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (hostname) DO UPDATE SET
                ip_address = EXCLUDED.ip_address,
                agent_id = EXCLUDED.agent_id,
                snmp_enabled = EXCLUDED.snmp_enabled,
                snmp_frequency_seconds = EXCLUDED.snmp_frequency_seconds,
                ping_enabled = EXCLUDED.ping_enabled,
                ping_frequency_seconds = EXCLUDED.ping_frequency_seconds,
                snmp_params = EXCLUDED.snmp_params,
                updated_at = NOW()
            RETURNING {DEVICE_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(&input.hostname)
            .bind(&input.ip_address)
            .bind(input.agent_id)
            .bind(input.snmp_enabled)
            .bind(input.snmp_frequency_seconds)
            .bind(input.ping_enabled)
            .bind(input.ping_frequency_seconds)
            .bind(&input.snmp_params)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| write_error(e, &input.hostname))?;

        row_to_device(&row)
    }

    async fn delete(&self, id: i64) -> DispatchResult<bool> {
        let result = sqlx::query("DELETE FROM devices WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn assign_agent(&self, device_id: i64, agent_id: i64) -> DispatchResult<()> {
        let result = sqlx::query(
            "UPDATE devices SET agent_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(device_id)
        .bind(agent_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DispatchError::DeviceNotFound { id: device_id });
        }

        debug!("设备 {} 绑定到Agent {}", device_id, agent_id);
        Ok(())
    }
}
