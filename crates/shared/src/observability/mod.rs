//! 统一可观测性模块
//!
//! 提供日志与指标描述的统一初始化。
//! 引擎本身只通过 metrics facade 记录指标，导出器由宿主进程决定是否安装。

pub mod tracing;

use ::tracing::info;
use anyhow::Result;
use serde::Deserialize;

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// 服务名称，用于标识日志来源
    pub service_name: String,

    /// 日志级别（如 "info", "debug"）
    pub log_level: String,

    /// 是否启用 JSON 格式日志
    pub json_logs: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

impl ObservabilityConfig {
    /// 从环境变量加载配置
    pub fn from_env(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| default_log_level()),
            json_logs: std::env::var("JSON_LOGS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    /// 注入服务名（配置文件中未指定时使用）
    pub fn with_service_name(mut self, service_name: &str) -> Self {
        if self.service_name.is_empty() {
            self.service_name = service_name.to_string();
        }
        self
    }
}

/// 统一初始化可观测性
///
/// 初始化顺序：
/// 1. Tracing（日志）
/// 2. 指标描述（HELP 文本）
///
/// # Example
///
/// ```ignore
/// use reforge_shared::observability::{init, ObservabilityConfig};
///
/// fn main() -> anyhow::Result<()> {
///     let config = ObservabilityConfig::from_env("reforge-engine");
///     init(&config)?;
///     Ok(())
/// }
/// ```
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    tracing::init(config)?;
    describe_metrics();

    info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "Observability initialized"
    );

    Ok(())
}

/// 注册引擎使用的指标描述
///
/// 这些描述会在宿主安装 recorder 后出现在导出端点的 HELP 注释中。
pub fn describe_metrics() {
    metrics::describe_counter!(
        "holder_cache_hits_total",
        "Holder resolutions served from the cache"
    );
    metrics::describe_counter!(
        "holder_cache_misses_total",
        "Holder resolutions that queried every provider"
    );
    metrics::describe_counter!(
        "effect_lifecycle_failures_total",
        "Enable, disable or reload calls that returned an error"
    );
    metrics::describe_counter!(
        "chain_executions_total",
        "Effect chain executions by executor and result"
    );
    metrics::describe_counter!(
        "trigger_dispatches_total",
        "Triggers dispatched to active effects"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs);
    }

    #[test]
    fn test_with_service_name_keeps_explicit_name() {
        let config = ObservabilityConfig {
            service_name: "custom".to_string(),
            ..Default::default()
        }
        .with_service_name("reforge-engine");
        assert_eq!(config.service_name, "custom");

        let config = ObservabilityConfig::default().with_service_name("reforge-engine");
        assert_eq!(config.service_name, "reforge-engine");
    }
}
