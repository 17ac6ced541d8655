use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use pollmaster_core::config::models::MAX_LOG_LEVEL;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::writer::BoxMakeWriter, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter,
    Registry,
};

/// 日志目录下的文件名
pub const LOG_FILE_NAME: &str = "pollmaster.log";

/// 详细级别到过滤指令的映射
pub fn filter_directive(level: u8) -> &'static str {
    match level {
        0 => "info",
        1 => "info,pollmaster=debug",
        2 => "debug",
        _ => "trace",
    }
}

/// 运行时日志级别控制器，供 `/-/debug` 使用
#[derive(Clone)]
pub struct LogLevelController {
    handle: Option<reload::Handle<EnvFilter, Registry>>,
    level: Arc<AtomicU8>,
}

impl LogLevelController {
    /// 不关联任何subscriber的控制器，只记录级别
    pub fn detached(level: u8) -> Self {
        Self {
            handle: None,
            level: Arc::new(AtomicU8::new(level.min(MAX_LOG_LEVEL))),
        }
    }

    pub fn level(&self) -> u8 {
        self.level.load(Ordering::Relaxed)
    }

    pub fn set_level(&self, level: u8) -> Result<()> {
        if level > MAX_LOG_LEVEL {
            return Err(anyhow::anyhow!("无效的日志级别: {level}"));
        }

        if let Some(handle) = &self.handle {
            handle
                .reload(EnvFilter::new(filter_directive(level)))
                .context("重新加载日志过滤器失败")?;
        }
        self.level.store(level, Ordering::Relaxed);
        tracing::info!(level, "日志级别已更新");
        Ok(())
    }
}

/// 持有后台写日志线程，drop时刷新未写完的日志
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// 未指定目录时写stderr
fn log_writer(log_dir: Option<&Path>) -> Result<(BoxMakeWriter, Option<WorkerGuard>)> {
    let Some(dir) = log_dir else {
        return Ok((BoxMakeWriter::new(std::io::stderr), None));
    };

    fs::create_dir_all(dir)
        .with_context(|| format!("创建日志目录失败: {}", dir.display()))?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(LOG_FILE_NAME)
        .build(dir)
        .with_context(|| format!("打开日志文件失败: {}", dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Ok((BoxMakeWriter::new(writer), Some(guard)))
}

/// 初始化日志系统
///
/// `RUST_LOG` 存在时优先于配置的级别。返回的 [`LoggingGuard`] 需要保持到进程退出。
pub fn init_logging(
    level: u8,
    format: &str,
    log_dir: Option<&Path>,
) -> Result<(LogLevelController, LoggingGuard)> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level)));
    let (filter, handle) = reload::Layer::new(env_filter);

    let (writer, file_guard) = log_writer(log_dir)?;
    let ansi = file_guard.is_none();
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        "json" => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(ansi)
                        .json(),
                )
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(ansi)
                        .pretty(),
                )
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {format}"));
        }
    }

    let controller = LogLevelController {
        handle: Some(handle),
        level: Arc::new(AtomicU8::new(level.min(MAX_LOG_LEVEL))),
    };
    Ok((
        controller,
        LoggingGuard {
            _file_guard: file_guard,
        },
    ))
}
