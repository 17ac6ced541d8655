use async_trait::async_trait;
use pollmaster_core::{DispatchError, DispatchResult};
use pollmaster_domain::{entities::Agent, repositories::AgentRepository};
use sqlx::{PgPool, Row};
use tracing::debug;

/// PostgreSQL Agent仓储实现
pub struct PostgresAgentRepository {
    pool: PgPool,
}

impl PostgresAgentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_agent(row: &sqlx::postgres::PgRow) -> DispatchResult<Agent> {
        let port: i32 = row.try_get("port")?;
        let weight: i32 = row.try_get("weight")?;

        Ok(Agent {
            id: row.try_get("id")?,
            host: row.try_get("host")?,
            port: u16::try_from(port)
                .map_err(|_| DispatchError::DatabaseOperation(format!("无效的Agent端口: {port}")))?,
            weight: u32::try_from(weight.max(1)).unwrap_or(1),
        })
    }
}

#[async_trait]
impl AgentRepository for PostgresAgentRepository {
    async fn list_active(&self) -> DispatchResult<Vec<Agent>> {
        let rows = sqlx::query(
            "SELECT id, host, port, weight FROM agents WHERE enabled ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let agents = rows
            .iter()
            .map(Self::row_to_agent)
            .collect::<DispatchResult<Vec<_>>>()?;

        debug!("从数据库加载了 {} 个Agent", agents.len());
        Ok(agents)
    }
}
