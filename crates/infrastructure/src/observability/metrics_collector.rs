//! 分发器的运行指标
//!
//! 未安装recorder时（例如测试中）所有指标都是空操作。

use anyhow::{Context, Result};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use pollmaster_domain::entities::JobKind;

/// 分发器指标收集器
#[derive(Debug, Clone, Default)]
pub struct DispatchMetrics;

impl DispatchMetrics {
    pub fn new() -> Self {
        Self
    }

    /// 一次调度周期的统计
    pub fn record_tick(&self, kind: JobKind, fetched: usize, dispatched: usize, seconds: f64) {
        let kind = kind.as_str();
        counter!("pollmaster_jobs_fetched_total", "kind" => kind).increment(fetched as u64);
        counter!("pollmaster_jobs_dispatched_total", "kind" => kind).increment(dispatched as u64);
        histogram!("pollmaster_tick_duration_seconds", "kind" => kind).record(seconds);
    }

    pub fn record_locked_skip(&self, kind: JobKind) {
        counter!("pollmaster_jobs_skipped_locked_total", "kind" => kind.as_str()).increment(1);
    }

    pub fn record_no_agent(&self, kind: JobKind) {
        counter!("pollmaster_jobs_no_agent_total", "kind" => kind.as_str()).increment(1);
    }

    pub fn record_unstick(&self) {
        counter!("pollmaster_device_unstick_total").increment(1);
    }

    pub fn record_dispatch_result(&self, kind: JobKind, success: bool) {
        let result = if success { "success" } else { "failure" };
        counter!("pollmaster_dispatch_requests_total", "kind" => kind.as_str(), "result" => result)
            .increment(1);
    }

    pub fn record_outbox_full(&self) {
        counter!("pollmaster_outbox_rejected_total").increment(1);
    }

    pub fn record_report(&self, kind: JobKind, applied: usize, duplicates: usize) {
        counter!("pollmaster_report_results_total", "kind" => kind.as_str()).increment(applied as u64);
        counter!("pollmaster_report_duplicates_total", "kind" => kind.as_str())
            .increment(duplicates as u64);
    }

    pub fn record_swept_locks(&self, count: usize) {
        counter!("pollmaster_device_locks_swept_total").increment(count as u64);
    }

    pub fn set_agent_counts(&self, alive: usize, unreachable: usize) {
        gauge!("pollmaster_agents", "status" => "alive").set(alive as f64);
        gauge!("pollmaster_agents", "status" => "unreachable").set(unreachable as f64);
    }

    pub fn set_master(&self, is_master: bool) {
        gauge!("pollmaster_is_master").set(if is_master { 1.0 } else { 0.0 });
    }
}

/// 安装全局Prometheus recorder，返回用于渲染 `/metrics` 的句柄
pub fn install_prometheus_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("安装Prometheus指标recorder失败")
}
