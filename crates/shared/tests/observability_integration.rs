//! 可观测性模块集成测试
//!
//! 测试日志初始化与指标描述在未安装 recorder 时的行为。

use reforge_shared::config::AppConfig;
use reforge_shared::observability::{self, ObservabilityConfig};

#[test]
fn test_describe_metrics_without_recorder() {
    // 未安装 recorder 时描述调用应为空操作
    observability::describe_metrics();
    observability::describe_metrics();
}

#[test]
fn test_init_only_once() {
    let config = ObservabilityConfig::default().with_service_name("reforge-engine");

    observability::init(&config).unwrap();

    // 全局 subscriber 已设置，再次初始化返回错误而不是 panic
    assert!(observability::init(&config).is_err());
}

#[test]
fn test_from_env_keeps_service_name() {
    let config = ObservabilityConfig::from_env("reforge-engine");
    assert_eq!(config.service_name, "reforge-engine");
    assert!(!config.log_level.is_empty());
}

#[test]
fn test_app_config_defaults_feed_observability() {
    let config = AppConfig::default();
    let obs = config
        .observability
        .clone()
        .with_service_name("reforge-engine");

    assert_eq!(obs.service_name, "reforge-engine");
    assert!(!config.is_production());
    assert_eq!(config.engine.holder_cache_ttl_ms, 4000);
}
