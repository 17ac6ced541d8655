//! 配置管理
//!
//! 配置按以下顺序叠加，后者覆盖前者：
//!
//! - 内置默认值
//! - TOML配置文件
//! - `POLLMASTER_` 前缀的环境变量（嵌套字段用 `__` 连接，如 `POLLMASTER_DATABASE__URL`）
//! - 命令行参数（由二进制入口处理）
//!
//! 所有模型都提供 `validate()`，致命的配置错误在任何周期任务启动前被拒绝。

pub mod models;

pub use models::{
    AppConfig, ClusterConfig, DatabaseConfig, DispatcherConfig, ObservabilityConfig,
    ServerConfig,
};

#[cfg(test)]
mod tests;
