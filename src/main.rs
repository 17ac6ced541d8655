use std::process::ExitCode;

use clap::Parser;
use pollmaster_core::AppConfig;

mod app;

/// 监控轮询任务分发器
#[derive(Debug, Parser)]
#[command(name = "pollmaster", version, about = "监控轮询任务分发器")]
pub struct Cli {
    /// 配置文件路径
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<String>,

    /// HTTP监听IP
    #[arg(long)]
    pub ip: Option<String>,

    /// HTTP监听端口
    #[arg(short, long)]
    pub port: Option<u16>,

    /// 主数据库连接串
    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    /// 集群租约ID，0表示单实例
    #[arg(long)]
    pub lock_id: Option<i64>,

    /// 租约专用数据库连接串
    #[arg(long, value_name = "URL")]
    pub lock_url: Option<String>,

    /// 集群内所有分发器地址，逗号分隔
    #[arg(long, value_delimiter = ',')]
    pub hosts: Option<Vec<String>>,

    /// 日志详细级别 (0-3)
    #[arg(short = 'l', long, value_parser = clap::value_parser!(u8).range(0..=3))]
    pub log_level: Option<u8>,

    /// 日志格式
    #[arg(long, value_parser = ["json", "pretty"])]
    pub log_format: Option<String>,

    /// 日志文件目录，不指定时输出到stderr
    #[arg(long = "log", value_name = "DIR")]
    pub log_dir: Option<String>,
}

impl Cli {
    /// 命令行参数覆盖文件和环境变量中的配置
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(ip) = &self.ip {
            config.server.ip = ip.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(url) = &self.database_url {
            config.database.url = url.clone();
        }
        if let Some(lock_id) = self.lock_id {
            config.cluster.lock_id = lock_id;
        }
        if let Some(lock_url) = &self.lock_url {
            config.cluster.lock_url = Some(lock_url.clone());
        }
        if let Some(hosts) = &self.hosts {
            config.cluster.hosts = hosts.clone();
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        if let Some(format) = &self.log_format {
            config.observability.log_format = format.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.observability.log_dir = Some(dir.clone());
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match app::run(cli).await {
        Ok(code) => code,
        Err(err) => {
            // 日志初始化之后的错误已在 app::run 中记录
            if !tracing::dispatcher::has_been_set() {
                eprintln!("分发器启动失败: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::try_parse_from([
            "pollmaster",
            "--port",
            "9090",
            "--lock-id",
            "7",
            "--lock-url",
            "postgres://lock@db/pollmaster",
            "--hosts",
            "a:8080,b:8080",
            "-l",
            "2",
            "--log",
            "/var/log/pollmaster",
        ])
        .unwrap();

        let mut config = AppConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.cluster.lock_id, 7);
        assert_eq!(
            config.cluster.lock_url.as_deref(),
            Some("postgres://lock@db/pollmaster")
        );
        assert_eq!(config.cluster.hosts, vec!["a:8080", "b:8080"]);
        assert_eq!(config.observability.log_level, 2);
        assert_eq!(
            config.observability.log_dir.as_deref(),
            Some("/var/log/pollmaster")
        );
    }

    #[test]
    fn test_cli_without_flags_keeps_config() {
        let cli = Cli::try_parse_from(["pollmaster"]).unwrap();
        let mut config = AppConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.server.port, AppConfig::default().server.port);
        assert_eq!(config.cluster.lock_id, 0);
    }

    #[test]
    fn test_cli_rejects_out_of_range_log_level() {
        assert!(Cli::try_parse_from(["pollmaster", "--log-level", "4"]).is_err());
        assert!(Cli::try_parse_from(["pollmaster", "--log-format", "xml"]).is_err());
    }
}
