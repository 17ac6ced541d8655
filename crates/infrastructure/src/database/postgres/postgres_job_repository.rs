use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pollmaster_core::DispatchResult;
use pollmaster_domain::{
    entities::{DeviceResult, JobKind, JobReport, PollingJob},
    repositories::JobRepository,
};
use sqlx::{PgPool, Row};
use tracing::debug;

use super::postgres_device_repository::{row_to_device, DEVICE_COLUMNS};

/// 到期查询按协议区分的列名
struct KindColumns {
    enabled: &'static str,
    next_due: &'static str,
    frequency: &'static str,
}

fn kind_columns(kind: JobKind) -> KindColumns {
    match kind {
        JobKind::Snmp => KindColumns {
            enabled: "snmp_enabled",
            next_due: "next_snmp_at",
            frequency: "snmp_frequency_seconds",
        },
        JobKind::Ping => KindColumns {
            enabled: "ping_enabled",
            next_due: "next_ping_at",
            frequency: "ping_frequency_seconds",
        },
    }
}

/// 由 `devices` 表派生出轮询任务的PostgreSQL实现
pub struct PostgresJobRepository {
    pool: PgPool,
}

impl PostgresJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 生成到期查询语句，启动时也用于校验语句能否准备成功
    pub fn due_jobs_sql(kind: JobKind) -> String {
        let cols = kind_columns(kind);
        format!(
            "SELECT {DEVICE_COLUMNS}, COALESCE({next}, created_at) AS due_at \
             FROM devices \
             WHERE {enabled} AND COALESCE({next}, created_at) <= $1 \
             ORDER BY due_at ASC, id ASC \
             LIMIT $2",
            next = cols.next_due,
            enabled = cols.enabled,
        )
    }

    pub fn mark_dispatched_sql(kind: JobKind) -> String {
        let cols = kind_columns(kind);
        format!(
            "UPDATE devices SET {next} = $2 + {freq} * INTERVAL '1 second' WHERE id = $1",
            next = cols.next_due,
            freq = cols.frequency,
        )
    }

    pub const RECORD_OUTCOME_SQL: &'static str = r#"
        INSERT INTO job_reports (dispatch_id, device_id, agent_id, kind, success, error, duration_ms, reported_at)
        SELECT $1, $2, $3, $4, $5, $6, $7, $8
        WHERE EXISTS (SELECT 1 FROM devices WHERE id = $2)
        ON CONFLICT (dispatch_id, device_id) DO NOTHING
    "#;
}

#[async_trait]
impl JobRepository for PostgresJobRepository {
    async fn fetch_due_jobs(
        &self,
        kind: JobKind,
        now: DateTime<Utc>,
        limit: usize,
    ) -> DispatchResult<Vec<PollingJob>> {
        let sql = Self::due_jobs_sql(kind);
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in &rows {
            jobs.push(PollingJob {
                kind,
                device: row_to_device(row)?,
                due_at: row.try_get("due_at")?,
            });
        }

        debug!("获取到 {} 个到期的{}任务", jobs.len(), kind);
        Ok(jobs)
    }

    async fn mark_dispatched(
        &self,
        kind: JobKind,
        device_id: i64,
        at: DateTime<Utc>,
    ) -> DispatchResult<()> {
        let sql = Self::mark_dispatched_sql(kind);
        sqlx::query(&sql)
            .bind(device_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_outcome(
        &self,
        report: &JobReport,
        result: &DeviceResult,
        at: DateTime<Utc>,
    ) -> DispatchResult<bool> {
        let duration_ms = result
            .duration_ms
            .map(|ms| i64::try_from(ms).unwrap_or(i64::MAX));

        let inserted = sqlx::query(Self::RECORD_OUTCOME_SQL)
            .bind(report.dispatch_id)
            .bind(result.device_id)
            .bind(report.agent_id)
            .bind(report.kind.as_str())
            .bind(result.success)
            .bind(&result.error)
            .bind(duration_ms)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(inserted.rows_affected() == 1)
    }
}
