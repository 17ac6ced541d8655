use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use pollmaster_api::{create_app, AppState};
use pollmaster_core::{AppConfig, ShutdownManager, ShutdownReason};
use pollmaster_dispatcher::{DispatchController, DispatchDeps, LeaderCoordinator, RunOutcome};
use pollmaster_infrastructure::{
    init_logging, install_prometheus_recorder, mask_database_url, DatabaseManager,
    DispatchMetrics, HttpAgentClient, LogLevelController, PostgresAdvisoryLease,
};
use tokio::{net::TcpListener, signal};
use tracing::{error, info, warn};

use crate::Cli;

/// HTTP服务优雅关闭的最长等待时间
const SERVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// 启动分发器并运行到关闭，返回进程退出码
pub async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config =
        AppConfig::load_unvalidated(cli.config.as_deref()).context("加载配置失败")?;
    cli.apply(&mut config);
    config.validate()?;

    let (log_level, _logging_guard) = init_logging(
        config.observability.log_level,
        &config.observability.log_format,
        config.observability.log_dir.as_deref().map(Path::new),
    )?;
    info!(version = env!("CARGO_PKG_VERSION"), "启动pollmaster分发器");

    // 在guard释放前记录失败原因，否则写不进日志文件
    let result = serve(config, log_level).await;
    if let Err(err) = &result {
        error!("分发器异常退出: {err:#}");
    }
    result
}

async fn serve(config: AppConfig, log_level: LogLevelController) -> Result<ExitCode> {
    let prometheus = if config.observability.metrics_enabled {
        Some(install_prometheus_recorder()?)
    } else {
        None
    };
    let metrics = DispatchMetrics::new();

    info!(url = %mask_database_url(&config.database.url), "连接数据库");
    let database = DatabaseManager::new(&config.database).await?;
    if config.database.run_migrations {
        sqlx::migrate!("./migrations")
            .run(database.pool())
            .await
            .context("执行数据库迁移失败")?;
    }
    database.verify_queries().await?;

    let client = HttpAgentClient::new(config.dispatcher.dispatch_timeout())
        .context("创建Agent客户端失败")?;
    let deps = DispatchDeps {
        agents: Arc::new(database.agent_repository()),
        devices: Arc::new(database.device_repository()),
        jobs: Arc::new(database.job_repository()),
        lock_store: Arc::new(database.lock_store()),
        client: Arc::new(client),
    };

    let holder = holder_address(&config);
    let report_hosts = if config.cluster.hosts.is_empty() {
        vec![holder.clone()]
    } else {
        config.cluster.hosts.clone()
    };
    let leader = Arc::new(build_leader(&config, &holder, metrics.clone()));

    let shutdown = ShutdownManager::new();
    let controller = DispatchController::new(
        deps.clone(),
        &config.dispatcher,
        report_hosts,
        leader,
        shutdown.clone(),
        metrics,
    );

    // 在等待租约之前启动HTTP服务，从节点也能响应 /r/check
    let state = AppState {
        devices: deps.devices.clone(),
        ingress: controller.ingress(),
        leader: controller.leader(),
        log_level,
        metrics: prometheus,
    };
    let bind_address = config.server.bind_address()?;
    let listener = TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("绑定地址失败: {bind_address}"))?;
    info!("HTTP服务启动在 http://{bind_address}");

    let server_handle = {
        let shutdown = shutdown.clone();
        let app = create_app(state);
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async move { shutdown.wait_for_shutdown().await })
                .await
        })
    };

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            shutdown.shutdown(ShutdownReason::Signal).await;
        });
    }

    let result = controller.run().await;
    if let Err(err) = &result {
        shutdown
            .shutdown(ShutdownReason::Fatal(err.to_string()))
            .await;
    }

    match tokio::time::timeout(SERVER_SHUTDOWN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("HTTP服务已停止"),
        Ok(Ok(Err(e))) => error!("HTTP服务运行失败: {e}"),
        Ok(Err(e)) => error!("HTTP服务任务异常: {e}"),
        Err(_) => warn!("HTTP服务关闭超时，强制退出"),
    }
    database.close().await;

    let outcome = result.context("分发器运行失败")?;
    let code = match outcome {
        RunOutcome::Cancelled => {
            info!("等待租约期间收到关闭信号");
            ExitCode::SUCCESS
        }
        RunOutcome::Completed => match shutdown.reason().await {
            Some(reason) if !reason.is_clean() => {
                error!(?reason, "分发器异常关闭");
                ExitCode::FAILURE
            }
            _ => ExitCode::SUCCESS,
        },
    };

    info!("pollmaster分发器已退出");
    Ok(code)
}

/// 本进程对外的地址，同时作为租约持有者标识
fn holder_address(config: &AppConfig) -> String {
    let host = hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| config.server.ip.clone());
    format!("{}:{}", host, config.server.port)
}

fn build_leader(config: &AppConfig, holder: &str, metrics: DispatchMetrics) -> LeaderCoordinator {
    match (&config.cluster.lock_url, config.cluster.coordination_enabled()) {
        (Some(lock_url), true) => {
            info!(
                lock_id = config.cluster.lock_id,
                url = %mask_database_url(lock_url),
                "启用集群协调"
            );
            let lease = PostgresAdvisoryLease::new(
                lock_url.clone(),
                Duration::from_secs(config.cluster.lock_retry_interval_seconds),
            );
            LeaderCoordinator::new(Arc::new(lease), config.cluster.lock_id, holder, metrics)
        }
        _ => {
            info!("未启用集群协调，以单实例模式运行");
            LeaderCoordinator::standalone(holder, metrics)
        }
    }
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
