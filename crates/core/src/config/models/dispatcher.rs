use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 分发引擎配置
///
/// 所有频率以秒为单位，频率为0表示关闭对应的周期任务。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// 设备锁清扫频率
    pub device_unlock_freq_seconds: u64,
    /// 设备锁最长持有时间，超过即被强制释放
    pub device_max_lock_seconds: u64,
    /// Agent存活检查频率
    pub agent_keepalive_freq_seconds: u64,
    /// 每隔多少次存活检查从数据库重新加载一次Agent
    pub agent_reload_every: u64,
    /// 单次存活检查的超时时间
    pub agent_check_timeout_seconds: u64,
    pub snmp_query_freq_seconds: u64,
    pub ping_query_freq_seconds: u64,
    /// 每个ping请求包含的主机数
    pub ping_batch_count: usize,
    /// 每次从数据库拉取的SNMP任务上限
    pub max_snmp_jobs: usize,
    /// 每次从数据库拉取的ping任务上限
    pub max_ping_jobs: usize,
    /// Agent负载平均值的计算窗口
    pub load_avg_window_seconds: u64,
    /// 触发设备迁移（unstick）的最大负载差
    pub max_load_delta: f64,
    /// 同时进行的出站分发请求数
    pub dispatch_concurrency: usize,
    pub dispatch_timeout_seconds: u64,
    /// 调度器与出站分发worker之间的通道容量
    pub outbox_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            device_unlock_freq_seconds: 600,
            device_max_lock_seconds: 600,
            agent_keepalive_freq_seconds: 30,
            agent_reload_every: 10,
            agent_check_timeout_seconds: 5,
            snmp_query_freq_seconds: 30,
            ping_query_freq_seconds: 10,
            ping_batch_count: 100,
            max_snmp_jobs: 200,
            max_ping_jobs: 2000,
            load_avg_window_seconds: 30,
            max_load_delta: 0.2,
            dispatch_concurrency: 64,
            dispatch_timeout_seconds: 10,
            outbox_capacity: 1024,
        }
    }
}

impl DispatcherConfig {
    pub fn snmp_enabled(&self) -> bool {
        self.snmp_query_freq_seconds > 0
    }

    pub fn ping_enabled(&self) -> bool {
        self.ping_query_freq_seconds > 0
    }

    pub fn sweeper_enabled(&self) -> bool {
        self.device_unlock_freq_seconds > 0
    }

    pub fn keepalive_enabled(&self) -> bool {
        self.agent_keepalive_freq_seconds > 0
    }

    pub fn device_max_lock_age(&self) -> Duration {
        Duration::from_secs(self.device_max_lock_seconds)
    }

    pub fn load_avg_window(&self) -> Duration {
        Duration::from_secs(self.load_avg_window_seconds)
    }

    pub fn agent_check_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_check_timeout_seconds)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_seconds)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ping_enabled() && self.ping_batch_count == 0 {
            return Err(anyhow::anyhow!(
                "ping_batch_count不能为0（ping_query_freq_seconds = {}）",
                self.ping_query_freq_seconds
            ));
        }

        if self.ping_enabled() && self.max_ping_jobs == 0 {
            return Err(anyhow::anyhow!("启用ping时max_ping_jobs必须大于0"));
        }

        if self.snmp_enabled() && self.max_snmp_jobs == 0 {
            return Err(anyhow::anyhow!("启用SNMP时max_snmp_jobs必须大于0"));
        }

        if self.sweeper_enabled() && self.device_max_lock_seconds == 0 {
            return Err(anyhow::anyhow!("设备锁最长持有时间必须大于0"));
        }

        if self.keepalive_enabled() {
            if self.agent_reload_every == 0 {
                return Err(anyhow::anyhow!("agent_reload_every必须大于0"));
            }
            if self.agent_check_timeout_seconds == 0 {
                return Err(anyhow::anyhow!("Agent检查超时时间必须大于0"));
            }
        }

        if self.load_avg_window_seconds == 0 {
            return Err(anyhow::anyhow!("负载计算窗口必须大于0"));
        }

        if !self.max_load_delta.is_finite() || self.max_load_delta < 0.0 {
            return Err(anyhow::anyhow!(
                "max_load_delta必须是非负数: {}",
                self.max_load_delta
            ));
        }

        if self.dispatch_concurrency == 0 {
            return Err(anyhow::anyhow!("分发并发数必须大于0"));
        }

        if self.dispatch_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("分发超时时间必须大于0"));
        }

        if self.outbox_capacity == 0 {
            return Err(anyhow::anyhow!("分发通道容量必须大于0"));
        }

        Ok(())
    }
}
