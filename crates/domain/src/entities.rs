use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 轮询Agent，负责对设备执行SNMP查询和ping探测
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: i64,
    pub host: String,
    pub port: u16,
    /// 容量权重，放置时比较 load / weight
    pub weight: u32,
}

impl Agent {
    pub fn new(id: i64, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            host: host.into(),
            port,
            weight: 1,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// 按权重折算后的负载，权重至少按1计算
    pub fn weighted_load(&self, load: f64) -> f64 {
        load / f64::from(self.weight.max(1))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AgentStatus {
    #[serde(rename = "ALIVE")]
    Alive,
    #[serde(rename = "UNREACHABLE")]
    Unreachable,
}

/// 注册表中某个Agent的运行时视图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub agent: Agent,
    pub status: AgentStatus,
    /// 窗口内的平均负载
    pub load: f64,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Snmp,
    Ping,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Snmp => "snmp",
            JobKind::Ping => "ping",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 设备锁，token即持有它的分发ID
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceLock {
    pub token: Uuid,
    pub locked_at: DateTime<Utc>,
}

impl DeviceLock {
    pub fn is_expired(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        now - self.locked_at > max_age
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub id: i64,
    pub hostname: String,
    pub ip_address: String,
    pub agent_id: Option<i64>,
    pub snmp_enabled: bool,
    pub snmp_frequency_seconds: i32,
    pub ping_enabled: bool,
    pub ping_frequency_seconds: i32,
    pub snmp_params: serde_json::Value,
    pub next_snmp_at: Option<DateTime<Utc>>,
    pub next_ping_at: Option<DateTime<Utc>>,
    pub lock: Option<DeviceLock>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    /// 由输入创建新设备，新设备立即到期
    pub fn from_input(id: i64, input: &DeviceInput, now: DateTime<Utc>) -> Self {
        Self {
            id,
            hostname: input.hostname.clone(),
            ip_address: input.ip_address.clone(),
            agent_id: input.agent_id,
            snmp_enabled: input.snmp_enabled,
            snmp_frequency_seconds: input.snmp_frequency_seconds,
            ping_enabled: input.ping_enabled,
            ping_frequency_seconds: input.ping_frequency_seconds,
            snmp_params: input.snmp_params.clone(),
            next_snmp_at: None,
            next_ping_at: None,
            lock: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 用输入覆盖可编辑字段，保留调度和锁状态
    pub fn apply(&mut self, input: &DeviceInput, now: DateTime<Utc>) {
        self.hostname = input.hostname.clone();
        self.ip_address = input.ip_address.clone();
        self.agent_id = input.agent_id;
        self.snmp_enabled = input.snmp_enabled;
        self.snmp_frequency_seconds = input.snmp_frequency_seconds;
        self.ping_enabled = input.ping_enabled;
        self.ping_frequency_seconds = input.ping_frequency_seconds;
        self.snmp_params = input.snmp_params.clone();
        self.updated_at = now;
    }

    pub fn is_enabled(&self, kind: JobKind) -> bool {
        match kind {
            JobKind::Snmp => self.snmp_enabled,
            JobKind::Ping => self.ping_enabled,
        }
    }

    pub fn frequency(&self, kind: JobKind) -> Duration {
        let seconds = match kind {
            JobKind::Snmp => self.snmp_frequency_seconds,
            JobKind::Ping => self.ping_frequency_seconds,
        };
        Duration::seconds(i64::from(seconds.max(1)))
    }

    /// 下次到期时间，从未调度过的设备按创建时间计
    pub fn due_at(&self, kind: JobKind) -> DateTime<Utc> {
        let next = match kind {
            JobKind::Snmp => self.next_snmp_at,
            JobKind::Ping => self.next_ping_at,
        };
        next.unwrap_or(self.created_at)
    }

    pub fn set_next_due(&mut self, kind: JobKind, at: DateTime<Utc>) {
        match kind {
            JobKind::Snmp => self.next_snmp_at = Some(at),
            JobKind::Ping => self.next_ping_at = Some(at),
        }
    }

    pub fn to_target(&self, kind: JobKind) -> DispatchTarget {
        DispatchTarget {
            device_id: self.id,
            hostname: self.hostname.clone(),
            ip_address: self.ip_address.clone(),
            snmp_params: match kind {
                JobKind::Snmp => Some(self.snmp_params.clone()),
                JobKind::Ping => None,
            },
        }
    }
}

/// 设备管理接口的输入
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceInput {
    pub hostname: String,
    pub ip_address: String,
    #[serde(default)]
    pub agent_id: Option<i64>,
    #[serde(default = "default_true")]
    pub snmp_enabled: bool,
    #[serde(default = "default_snmp_frequency")]
    pub snmp_frequency_seconds: i32,
    #[serde(default = "default_true")]
    pub ping_enabled: bool,
    #[serde(default = "default_ping_frequency")]
    pub ping_frequency_seconds: i32,
    #[serde(default)]
    pub snmp_params: serde_json::Value,
}

fn default_true() -> bool {
    true
}

fn default_snmp_frequency() -> i32 {
    300
}

fn default_ping_frequency() -> i32 {
    60
}

impl DeviceInput {
    pub fn new(hostname: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ip_address: ip_address.into(),
            agent_id: None,
            snmp_enabled: true,
            snmp_frequency_seconds: default_snmp_frequency(),
            ping_enabled: true,
            ping_frequency_seconds: default_ping_frequency(),
            snmp_params: serde_json::Value::Null,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.hostname.trim().is_empty() {
            return Err("hostname不能为空".to_string());
        }
        if self.ip_address.parse::<std::net::IpAddr>().is_err() {
            return Err(format!("无效的IP地址: {}", self.ip_address));
        }
        if self.snmp_frequency_seconds <= 0 || self.ping_frequency_seconds <= 0 {
            return Err("轮询频率必须大于0".to_string());
        }
        Ok(())
    }
}

/// 数据库到期查询产生的轮询任务
#[derive(Debug, Clone)]
pub struct PollingJob {
    pub kind: JobKind,
    pub device: Device,
    pub due_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchTarget {
    pub device_id: i64,
    pub hostname: String,
    pub ip_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snmp_params: Option<serde_json::Value>,
}

/// 调度器交给出站worker的分发请求
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// 分发ID，同时也是目标设备的锁token
    pub dispatch_id: Uuid,
    pub kind: JobKind,
    pub agent: Agent,
    pub targets: Vec<DispatchTarget>,
    /// Agent完成后上报的地址
    pub report_hosts: Vec<String>,
}

impl DispatchRequest {
    pub fn device_ids(&self) -> Vec<i64> {
        self.targets.iter().map(|t| t.device_id).collect()
    }
}

/// Agent完成轮询后的上报
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobReport {
    pub dispatch_id: Uuid,
    pub agent_id: i64,
    pub kind: JobKind,
    #[serde(default)]
    pub load: Option<f64>,
    pub results: Vec<DeviceResult>,
}

impl JobReport {
    pub fn validate(&self) -> Result<(), String> {
        if self.results.is_empty() {
            return Err("上报不包含任何设备结果".to_string());
        }
        if let Some(load) = self.load {
            if !load.is_finite() || load < 0.0 {
                return Err(format!("无效的负载值: {load}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceResult {
    pub device_id: i64,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_load() {
        let agent = Agent::new(1, "10.0.0.1", 8000).with_weight(4);
        assert_eq!(agent.weighted_load(2.0), 0.5);

        let zero = Agent::new(2, "10.0.0.2", 8000).with_weight(0);
        assert_eq!(zero.weighted_load(2.0), 2.0);
        assert_eq!(zero.address(), "10.0.0.2:8000");
    }

    #[test]
    fn test_device_due_at_falls_back_to_created_at() {
        let now = Utc::now();
        let mut device = Device::from_input(1, &DeviceInput::new("sw1", "10.1.0.1"), now);
        assert_eq!(device.due_at(JobKind::Snmp), now);

        let later = now + Duration::seconds(300);
        device.set_next_due(JobKind::Snmp, later);
        assert_eq!(device.due_at(JobKind::Snmp), later);
        assert_eq!(device.due_at(JobKind::Ping), now);
    }

    #[test]
    fn test_device_lock_expiry() {
        let now = Utc::now();
        let lock = DeviceLock {
            token: Uuid::new_v4(),
            locked_at: now - Duration::seconds(601),
        };
        assert!(lock.is_expired(Duration::seconds(600), now));
        assert!(!lock.is_expired(Duration::seconds(900), now));
    }

    #[test]
    fn test_device_input_defaults_from_json() {
        let input: DeviceInput =
            serde_json::from_str(r#"{"hostname":"core-1","ip_address":"192.0.2.1"}"#).unwrap();
        assert!(input.snmp_enabled);
        assert_eq!(input.ping_frequency_seconds, 60);
        assert!(input.validate().is_ok());

        let bad = DeviceInput::new("core-1", "not-an-ip");
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_report_validation() {
        let mut report = JobReport {
            dispatch_id: Uuid::new_v4(),
            agent_id: 1,
            kind: JobKind::Ping,
            load: Some(0.4),
            results: vec![DeviceResult {
                device_id: 1,
                success: true,
                error: None,
                duration_ms: Some(12),
            }],
        };
        assert!(report.validate().is_ok());

        report.load = Some(f64::INFINITY);
        assert!(report.validate().is_err());

        report.load = None;
        report.results.clear();
        assert!(report.validate().is_err());
    }

    #[test]
    fn test_ping_target_has_no_snmp_params() {
        let device = Device::from_input(3, &DeviceInput::new("sw3", "10.1.0.3"), Utc::now());
        assert!(device.to_target(JobKind::Ping).snmp_params.is_none());
        assert!(device.to_target(JobKind::Snmp).snmp_params.is_some());
    }
}
