use std::time::Duration;

use anyhow::{Context, Result};
use pollmaster_core::config::DatabaseConfig;
use pollmaster_domain::entities::JobKind;
use sqlx::{Executor, PgPool};
use tracing::{debug, info};

use super::postgres::{
    PostgresAgentRepository, PostgresDeviceLockStore, PostgresDeviceRepository,
    PostgresJobRepository,
};

/// 数据库连接池管理器
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    /// 创建新的数据库管理器
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&config.url)
            .await
            .context("连接数据库失败")?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 检查数据库连接健康状态
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("数据库健康检查失败")?;
        Ok(())
    }

    /// 在任何周期任务启动前准备所有运行期语句，表结构不匹配时立即失败
    pub async fn verify_queries(&self) -> Result<()> {
        let mut statements = vec![
            "SELECT id, host, port, weight FROM agents WHERE enabled ORDER BY id ASC".to_string(),
            PostgresDeviceLockStore::TRY_LOCK_SQL.to_string(),
            PostgresDeviceLockStore::UNLOCK_SQL.to_string(),
            PostgresDeviceLockStore::RELEASE_IF_TOKEN_SQL.to_string(),
            PostgresDeviceLockStore::SWEEP_SQL.to_string(),
            PostgresJobRepository::RECORD_OUTCOME_SQL.to_string(),
        ];
        for kind in [JobKind::Snmp, JobKind::Ping] {
            statements.push(PostgresJobRepository::due_jobs_sql(kind));
            statements.push(PostgresJobRepository::mark_dispatched_sql(kind));
        }

        for sql in &statements {
            self.pool
                .prepare(sql.as_str())
                .await
                .with_context(|| format!("准备查询语句失败: {}", sql.trim()))?;
        }

        debug!("已准备 {} 条查询语句", statements.len());
        info!("数据库查询语句校验通过");
        Ok(())
    }

    pub fn agent_repository(&self) -> PostgresAgentRepository {
        PostgresAgentRepository::new(self.pool.clone())
    }

    pub fn device_repository(&self) -> PostgresDeviceRepository {
        PostgresDeviceRepository::new(self.pool.clone())
    }

    pub fn job_repository(&self) -> PostgresJobRepository {
        PostgresJobRepository::new(self.pool.clone())
    }

    pub fn lock_store(&self) -> PostgresDeviceLockStore {
        PostgresDeviceLockStore::new(self.pool.clone())
    }

    /// 关闭数据库连接池
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// 屏蔽数据库URL中的密码
pub fn mask_database_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            // 跳过 scheme 中的冒号
            if url[colon_pos + 1..].starts_with("//") || colon_pos + 1 >= at_pos {
                return url.to_string();
            }
            let mut masked = url.to_string();
            masked.replace_range(colon_pos + 1..at_pos, "***");
            return masked;
        }
    }
    url.to_string()
}
