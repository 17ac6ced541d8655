use crate::config::models::{
    AppConfig, ClusterConfig, DatabaseConfig, DispatcherConfig, ObservabilityConfig, ServerConfig,
};

#[test]
fn test_default_config_is_valid() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());
}

#[test]
fn test_database_validation() {
    let mut config = DatabaseConfig {
        url: "postgres://localhost/test".to_string(),
        ..DatabaseConfig::default()
    };

    assert!(config.validate().is_ok());

    config.url = "".to_string();
    assert!(config.validate().is_err());

    config.url = "mysql://localhost/test".to_string();
    assert!(config.validate().is_err());

    config.url = "postgresql://localhost/test".to_string();
    assert!(config.validate().is_ok());

    config.max_connections = 0;
    assert!(config.validate().is_err());

    config.max_connections = 10;
    config.min_connections = 15;
    assert!(config.validate().is_err());
}

#[test]
fn test_cluster_lock_url_rules() {
    let main_url = "postgres://db-main/pollmaster";

    // 关闭协调时不需要租约连接串
    let disabled = ClusterConfig::default();
    assert!(!disabled.coordination_enabled());
    assert!(disabled.validate(main_url).is_ok());

    let mut enabled = ClusterConfig {
        lock_id: 4242,
        ..ClusterConfig::default()
    };
    assert!(enabled.validate(main_url).is_err());

    enabled.lock_url = Some("redis://db-lock".to_string());
    assert!(enabled.validate(main_url).is_err());

    enabled.lock_url = Some(main_url.to_string());
    let err = enabled.validate(main_url).unwrap_err();
    assert!(err.to_string().contains("不同"));

    enabled.lock_url = Some("postgres://db-lock/pollmaster".to_string());
    assert!(enabled.validate(main_url).is_ok());

    enabled.lock_id = -1;
    assert!(enabled.validate(main_url).is_err());
}

#[test]
fn test_cluster_hosts_format() {
    let mut config = ClusterConfig {
        hosts: vec!["10.0.0.1:8080".to_string(), "dispatch-2:8080".to_string()],
        ..ClusterConfig::default()
    };
    assert!(config.validate("postgres://db/x").is_ok());

    config.hosts.push("missing-port".to_string());
    assert!(config.validate("postgres://db/x").is_err());
}

#[test]
fn test_ping_batch_count_zero_rejected_when_ping_enabled() {
    let mut config = DispatcherConfig {
        ping_query_freq_seconds: 10,
        ping_batch_count: 0,
        ..DispatcherConfig::default()
    };
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("ping_batch_count"));

    // ping关闭时批量大小为0是合法的
    config.ping_query_freq_seconds = 0;
    assert!(config.validate().is_ok());
}

#[test]
fn test_zero_frequencies_disable_features() {
    let config = DispatcherConfig {
        snmp_query_freq_seconds: 0,
        ping_query_freq_seconds: 0,
        device_unlock_freq_seconds: 0,
        agent_keepalive_freq_seconds: 0,
        ..DispatcherConfig::default()
    };

    assert!(config.validate().is_ok());
    assert!(!config.snmp_enabled());
    assert!(!config.ping_enabled());
    assert!(!config.sweeper_enabled());
    assert!(!config.keepalive_enabled());
}

#[test]
fn test_max_load_delta_must_be_non_negative() {
    let mut config = DispatcherConfig {
        max_load_delta: -0.1,
        ..DispatcherConfig::default()
    };
    assert!(config.validate().is_err());

    config.max_load_delta = f64::NAN;
    assert!(config.validate().is_err());

    config.max_load_delta = 0.0;
    assert!(config.validate().is_ok());
}

#[test]
fn test_snmp_batch_cap_required() {
    let config = DispatcherConfig {
        max_snmp_jobs: 0,
        ..DispatcherConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_server_validation() {
    let mut config = ServerConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.bind_address().unwrap().port(), 8080);

    config.ip = "not-an-ip".to_string();
    assert!(config.validate().is_err());

    config.ip = "127.0.0.1".to_string();
    config.port = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_observability_validation() {
    let mut config = ObservabilityConfig::default();
    assert!(config.validate().is_ok());

    config.log_level = 4;
    assert!(config.validate().is_err());

    config.log_level = 3;
    config.log_format = "xml".to_string();
    assert!(config.validate().is_err());

    config.log_format = "json".to_string();
    config.log_dir = Some("/var/log/pollmaster".to_string());
    assert!(config.validate().is_ok());

    config.log_dir = Some("  ".to_string());
    assert!(config.validate().is_err());
}

#[test]
fn test_app_config_reports_section() {
    let mut config = AppConfig::default();
    config.dispatcher.ping_batch_count = 0;

    let err = config.validate().unwrap_err();
    assert!(format!("{err:#}").contains("分发器配置验证失败"));
}
