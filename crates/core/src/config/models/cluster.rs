use serde::{Deserialize, Serialize};

use super::database::is_postgres_url;

/// 集群协调配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// 集群租约ID，0表示关闭协调（单实例模式，始终为master）
    pub lock_id: i64,
    /// 租约专用的数据库连接串，必须与主连接串不同
    pub lock_url: Option<String>,
    /// 集群内所有分发器的地址（host:port），作为Agent的上报目标
    pub hosts: Vec<String>,
    /// 等待租约时的重试间隔（秒）
    pub lock_retry_interval_seconds: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            lock_id: 0,
            lock_url: None,
            hosts: Vec::new(),
            lock_retry_interval_seconds: 5,
        }
    }
}

impl ClusterConfig {
    /// 是否启用集群协调
    pub fn coordination_enabled(&self) -> bool {
        self.lock_id > 0
    }

    pub fn validate(&self, main_url: &str) -> anyhow::Result<()> {
        if self.lock_id < 0 {
            return Err(anyhow::anyhow!("租约ID不能为负数: {}", self.lock_id));
        }

        if self.coordination_enabled() {
            let lock_url = self
                .lock_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("启用集群协调时必须配置租约连接串"))?;

            if !is_postgres_url(lock_url) {
                return Err(anyhow::anyhow!(
                    "租约连接串必须以 postgres:// 或 postgresql:// 开头"
                ));
            }

            if lock_url == main_url {
                return Err(anyhow::anyhow!("租约连接串必须与主数据库连接串不同"));
            }
        }

        if self.lock_retry_interval_seconds == 0 {
            return Err(anyhow::anyhow!("租约重试间隔必须大于0"));
        }

        for host in &self.hosts {
            let valid = host
                .rsplit_once(':')
                .map(|(name, port)| !name.is_empty() && port.parse::<u16>().is_ok())
                .unwrap_or(false);
            if !valid {
                return Err(anyhow::anyhow!("集群地址格式无效: {}，应为 host:port", host));
            }
        }

        Ok(())
    }
}
