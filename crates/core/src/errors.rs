use thiserror::Error;

/// 分发器错误类型定义
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("Agent未找到: {id}")]
    AgentNotFound { id: i64 },

    #[error("设备未找到: {id}")]
    DeviceNotFound { id: i64 },

    #[error("数据冲突: {0}")]
    Conflict(String),

    #[error("Agent {agent} 不可达: {message}")]
    AgentUnreachable { agent: String, message: String },

    #[error("传输错误: {0}")]
    Transport(String),

    #[error("获取集群租约失败: {0}")]
    LeaseAcquisition(String),

    #[error("失去集群租约: {lease_id}")]
    LeaseLost { lease_id: i64 },

    #[error("无效的上报: {0}")]
    InvalidReport(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl DispatchError {
    /// 是否属于可在下一个调度周期内自行恢复的错误
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DispatchError::AgentUnreachable { .. } | DispatchError::Transport(_)
        )
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;
