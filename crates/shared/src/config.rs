//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::observability::ObservabilityConfig;

/// 引擎运行配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 持有者解析缓存的存活时间（毫秒）
    pub holder_cache_ttl_ms: u64,
    /// 宿主周期性刷新激活效果的间隔（毫秒）
    pub update_interval_ms: u64,
    /// 定义文件路径（链、持有者、主体）
    pub definitions_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            holder_cache_ttl_ms: 4000,
            update_interval_ms: 1000,
            definitions_path: "config/definitions.json".to_string(),
        }
    }
}

impl EngineConfig {
    /// 持有者缓存 TTL
    pub fn holder_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.holder_cache_ttl_ms)
    }

    /// 刷新间隔，最小 1 毫秒
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms.max(1))
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（REFORGE_ 前缀，如 REFORGE_ENGINE__HOLDER_CACHE_TTL_MS -> engine.holder_cache_ttl_ms）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("REFORGE_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Self::load_from(service_name, Path::new(&config_dir), &env)
    }

    /// 从指定目录和环境名加载配置，环境变量覆盖仍然生效
    pub fn load_from(service_name: &str, config_dir: &Path, env: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            .add_source(
                File::from(config_dir.join(format!("{}.toml", service_name))).required(false),
            )
            // 双下划线分隔嵌套层级，单下划线保留在字段名中
            .add_source(
                Environment::with_prefix("REFORGE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut config: Self = builder.build()?.try_deserialize()?;

        if config.observability.service_name.is_empty() {
            config.observability.service_name = config.service_name.clone();
        }

        Ok(config)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.engine.holder_cache_ttl_ms, 4000);
        assert_eq!(config.engine.holder_cache_ttl(), Duration::from_secs(4));
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_update_interval_never_zero() {
        let config = EngineConfig {
            update_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.update_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_engine_config_partial_deserialize() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "holder_cache_ttl_ms": 250 }"#).unwrap();
        assert_eq!(config.holder_cache_ttl_ms, 250);
        assert_eq!(config.update_interval_ms, 1000);
        assert_eq!(config.definitions_path, "config/definitions.json");
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        let config = AppConfig::load_from(
            "reforge-engine",
            Path::new("/nonexistent-reforge-config"),
            "development",
        )
        .unwrap();
        assert_eq!(config.service_name, "reforge-engine");
        assert_eq!(config.environment, "development");
        assert_eq!(config.observability.service_name, "reforge-engine");
        assert_eq!(config.engine.holder_cache_ttl_ms, 4000);
    }

    #[test]
    fn test_later_files_override_default() {
        let dir = std::env::temp_dir().join(format!("reforge-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("default.toml"),
            "[engine]\nholder_cache_ttl_ms = 1000\nupdate_interval_ms = 50\n",
        )
        .unwrap();
        std::fs::write(dir.join("staging.toml"), "[engine]\nholder_cache_ttl_ms = 2000\n").unwrap();

        let config = AppConfig::load_from("reforge-engine", &dir, "staging").unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(config.engine.holder_cache_ttl_ms, 2000);
        assert_eq!(config.engine.update_interval_ms, 50);
        assert!(!config.is_production());
    }
}
