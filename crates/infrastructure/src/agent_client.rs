use std::time::Duration;

use async_trait::async_trait;
use pollmaster_core::{DispatchError, DispatchResult};
use pollmaster_domain::{
    entities::{Agent, DispatchRequest, DispatchTarget, JobKind},
    ports::{AgentClient, AgentHealth},
};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// Agent接收SNMP任务的路径
pub const AGENT_POLL_PATH: &str = "/r/poll";
/// Agent接收ping批次的路径
pub const AGENT_PING_PATH: &str = "/r/ping";
/// Agent存活检查路径
pub const AGENT_CHECK_PATH: &str = "/r/check";

/// 发送给Agent的分发请求体
#[derive(Debug, Serialize)]
struct DispatchPayload<'a> {
    dispatch_id: Uuid,
    kind: JobKind,
    targets: &'a [DispatchTarget],
    report_hosts: &'a [String],
}

/// 基于reqwest的Agent客户端
#[derive(Clone)]
pub struct HttpAgentClient {
    client: reqwest::Client,
}

impl HttpAgentClient {
    pub fn new(timeout: Duration) -> DispatchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Configuration(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self { client })
    }

    fn unreachable(agent: &Agent, err: impl std::fmt::Display) -> DispatchError {
        DispatchError::AgentUnreachable {
            agent: agent.address(),
            message: err.to_string(),
        }
    }

    fn dispatch_path(kind: JobKind) -> &'static str {
        match kind {
            JobKind::Snmp => AGENT_POLL_PATH,
            JobKind::Ping => AGENT_PING_PATH,
        }
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn check(&self, agent: &Agent) -> DispatchResult<AgentHealth> {
        let url = format!("{}{}", agent.base_url(), AGENT_CHECK_PATH);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::unreachable(agent, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::unreachable(agent, format!("HTTP {status}")));
        }

        // 应答体可以为空，也可以带上负载
        let body = response
            .bytes()
            .await
            .map_err(|e| Self::unreachable(agent, e))?;
        let health = serde_json::from_slice::<AgentHealth>(&body).unwrap_or_default();

        debug!(agent = %agent.address(), load = ?health.load, "Agent存活检查成功");
        Ok(health)
    }

    async fn dispatch(&self, request: &DispatchRequest) -> DispatchResult<()> {
        let agent = &request.agent;
        let url = format!("{}{}", agent.base_url(), Self::dispatch_path(request.kind));
        let payload = DispatchPayload {
            dispatch_id: request.dispatch_id,
            kind: request.kind,
            targets: &request.targets,
            report_hosts: &request.report_hosts,
        };

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Self::unreachable(agent, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Transport(format!(
                "Agent {} 拒绝了分发请求: HTTP {}",
                agent.address(),
                status
            )));
        }

        debug!(
            agent = %agent.address(),
            dispatch_id = %request.dispatch_id,
            targets = request.targets.len(),
            "分发请求已被Agent接受"
        );
        Ok(())
    }
}
