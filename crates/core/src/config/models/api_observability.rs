use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// HTTP服务（上报、设备管理、健康检查）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub ip: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> anyhow::Result<SocketAddr> {
        let ip: IpAddr = self
            .ip
            .parse()
            .map_err(|_| anyhow::anyhow!("监听IP格式无效: {}", self.ip))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ip.is_empty() {
            return Err(anyhow::anyhow!("监听IP不能为空"));
        }

        self.bind_address()?;

        if self.port == 0 {
            return Err(anyhow::anyhow!("监听端口必须大于0"));
        }

        Ok(())
    }
}

/// 允许的运行时日志详细级别上限
pub const MAX_LOG_LEVEL: u8 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// 日志详细级别（0-3）
    pub log_level: u8,
    /// "pretty" 或 "json"
    pub log_format: String,
    /// 日志文件目录，为空时输出到stderr
    pub log_dir: Option<String>,
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: 0,
            log_format: "pretty".to_string(),
            log_dir: None,
            metrics_enabled: true,
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.log_level > MAX_LOG_LEVEL {
            return Err(anyhow::anyhow!(
                "日志级别必须在0到{}之间: {}",
                MAX_LOG_LEVEL,
                self.log_level
            ));
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志格式: {}，支持的格式: {:?}",
                self.log_format,
                valid_formats
            ));
        }

        if matches!(&self.log_dir, Some(dir) if dir.trim().is_empty()) {
            return Err(anyhow::anyhow!("日志目录不能为空字符串"));
        }

        Ok(())
    }
}
