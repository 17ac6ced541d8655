use crate::config::models::AppConfig;
use std::io::Write;
use tempfile::NamedTempFile;

const SAMPLE_CONFIG: &str = r#"
[server]
ip = "127.0.0.1"
port = 9000

[database]
url = "postgres://db-main/pollmaster"

[cluster]
lock_id = 17
lock_url = "postgres://db-lock/pollmaster"
hosts = ["10.0.0.1:9000", "10.0.0.2:9000"]

[dispatcher]
snmp_query_freq_seconds = 0
ping_batch_count = 50
max_load_delta = 0.5
"#;

#[test]
fn test_load_from_file_merges_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(SAMPLE_CONFIG.as_bytes()).unwrap();

    let config = AppConfig::load(Some(file.path().to_str().unwrap())).unwrap();

    assert_eq!(config.server.port, 9000);
    assert_eq!(config.cluster.lock_id, 17);
    assert_eq!(config.cluster.hosts.len(), 2);
    assert!(!config.dispatcher.snmp_enabled());
    assert_eq!(config.dispatcher.ping_batch_count, 50);
    assert_eq!(config.dispatcher.max_load_delta, 0.5);
    // 未出现在文件中的字段保留默认值
    assert_eq!(config.dispatcher.ping_query_freq_seconds, 10);
    assert_eq!(config.dispatcher.agent_reload_every, 10);
    assert_eq!(config.database.max_connections, 10);
}

#[test]
fn test_load_missing_file_fails() {
    let result = AppConfig::load(Some("/nonexistent/pollmaster.toml"));
    assert!(result.is_err());
}

#[test]
fn test_load_rejects_invalid_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"[dispatcher]\nping_batch_count = 0\n").unwrap();

    assert!(AppConfig::load(Some(file.path().to_str().unwrap())).is_err());
    // 不校验的加载仍然成功，留给命令行覆盖后再校验
    assert!(AppConfig::load_unvalidated(Some(file.path().to_str().unwrap())).is_ok());
}

#[test]
fn test_toml_round_trip() {
    let config = AppConfig::from_toml(SAMPLE_CONFIG).unwrap();
    let serialized = config.to_toml().unwrap();
    let restored = AppConfig::from_toml(&serialized).unwrap();

    assert_eq!(restored.cluster.lock_url, config.cluster.lock_url);
    assert_eq!(restored.dispatcher.max_load_delta, 0.5);
}
