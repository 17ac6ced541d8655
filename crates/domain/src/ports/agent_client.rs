use async_trait::async_trait;
use pollmaster_core::DispatchResult;
use serde::{Deserialize, Serialize};

use crate::entities::{Agent, DispatchRequest};

/// Agent存活检查的应答
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentHealth {
    #[serde(default)]
    pub load: Option<f64>,
}

/// 与Agent通信的出站客户端
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn check(&self, agent: &Agent) -> DispatchResult<AgentHealth>;

    /// 把分发请求交给Agent，成功只代表Agent已接受，不等待轮询完成
    async fn dispatch(&self, request: &DispatchRequest) -> DispatchResult<()>;
}
