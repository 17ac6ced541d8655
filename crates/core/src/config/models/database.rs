use serde::{Deserialize, Serialize};

/// 允许的PostgreSQL连接串前缀
pub const POSTGRES_URL_SCHEMES: [&str; 2] = ["postgres://", "postgresql://"];

/// 检查连接串是否为可识别的PostgreSQL格式
pub fn is_postgres_url(url: &str) -> bool {
    POSTGRES_URL_SCHEMES
        .iter()
        .any(|scheme| url.starts_with(scheme))
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
    /// 启动时是否执行内置的数据库迁移
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/pollmaster".to_string(),
            max_connections: 10,
            min_connections: 1,
            connection_timeout_seconds: 30,
            idle_timeout_seconds: 600,
            run_migrations: true,
        }
    }
}

impl DatabaseConfig {
    /// Validate database configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.url.is_empty() {
            return Err(anyhow::anyhow!("数据库URL不能为空"));
        }

        if !is_postgres_url(&self.url) {
            return Err(anyhow::anyhow!(
                "数据库URL必须以 postgres:// 或 postgresql:// 开头"
            ));
        }

        if self.max_connections == 0 {
            return Err(anyhow::anyhow!("最大连接数必须大于0"));
        }

        if self.min_connections > self.max_connections {
            return Err(anyhow::anyhow!("最小连接数不能大于最大连接数"));
        }

        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("连接超时时间必须大于0"));
        }

        Ok(())
    }
}
