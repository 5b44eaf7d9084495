//! # 配置管理器
//!
//! 读取 TOML 配置文件并叠加环境变量覆盖，产出不可变的 `Arc<AppConfig>`。

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{AppConfig, Environment};
use crate::error::{ProxyError, Result};

/// 环境变量覆盖前缀，例如 `SESSION_BRIDGE_UPSTREAM_URL`
const ENV_PREFIX: &str = "SESSION_BRIDGE_";

/// 配置管理器
pub struct ConfigManager {
    /// 当前配置（启动后不再变化）
    config: Arc<AppConfig>,
    /// 已应用的环境变量覆盖数量
    overrides_applied: usize,
}

impl ConfigManager {
    /// 创建配置管理器
    ///
    /// 优先读取 `SESSION_BRIDGE_CONFIG_PATH`，否则按 `RUST_ENV` 选择
    /// `config/config.{env}.toml`；文件不存在时使用默认配置。
    pub fn new() -> Result<Self> {
        let config_file = if let Ok(path) = env::var("SESSION_BRIDGE_CONFIG_PATH") {
            path
        } else {
            let env = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
            format!("config/config.{env}.toml")
        };

        if Path::new(&config_file).exists() {
            Self::from_file(&config_file)
        } else {
            warn!("配置文件不存在: {}，使用默认配置", config_file);
            Self::from_config(AppConfig::default())
        }
    }

    /// 从指定文件创建配置管理器
    pub fn from_file(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref();
        let config_content = std::fs::read_to_string(config_path).map_err(|e| {
            ProxyError::config_with_source(format!("读取配置文件失败: {}", config_path.display()), e)
        })?;

        let config: AppConfig = toml::from_str(&config_content).map_err(|e| {
            ProxyError::config_with_source(
                format!("TOML解析失败 - 配置文件: {}, 详细错误: {e}", config_path.display()),
                e,
            )
        })?;

        info!("已加载配置文件: {}", config_path.display());
        Self::from_config(config)
    }

    /// 从已有配置创建（叠加环境变量覆盖后校验）
    pub fn from_config(config: AppConfig) -> Result<Self> {
        Self::with_overrides(config, &Self::build_env_overrides())
    }

    /// 使用给定的覆盖映射创建（键为 `upstream.url` 这类点分路径）
    pub fn with_overrides(
        mut config: AppConfig,
        overrides: &HashMap<String, String>,
    ) -> Result<Self> {
        Self::apply_env_overrides(&mut config, overrides)?;
        config.validate()?;

        info!("配置管理器初始化完成");
        info!("- 运行环境: {:?}", config.environment);
        info!("- 上游地址: {}", config.upstream.base_url);
        info!("- 身份库直连: {}", if config.identity.enabled { "启用" } else { "禁用" });
        info!("- 环境变量覆盖: {} 个", overrides.len());

        Ok(Self {
            config: Arc::new(config),
            overrides_applied: overrides.len(),
        })
    }

    /// 获取当前配置
    #[must_use]
    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config)
    }

    /// 已应用的环境变量覆盖数量
    #[must_use]
    pub const fn overrides_applied(&self) -> usize {
        self.overrides_applied
    }

    /// 构建环境变量覆盖映射
    fn build_env_overrides() -> HashMap<String, String> {
        let mut overrides = HashMap::new();

        for (key, value) in env::vars() {
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                // SESSION_BRIDGE_UPSTREAM_URL -> upstream.url
                if config_key == "CONFIG_PATH" {
                    continue;
                }
                let config_path = config_key.to_lowercase().replace('_', ".");
                overrides.insert(config_path, value);
            }
        }
        if let Ok(url) = env::var("DATABASE_URL") {
            overrides.insert("database.url".to_string(), url);
        }

        debug!("发现 {} 个环境变量覆盖", overrides.len());
        overrides
    }

    /// 应用环境变量覆盖
    fn apply_env_overrides(
        config: &mut AppConfig,
        overrides: &HashMap<String, String>,
    ) -> Result<()> {
        for (path, value) in overrides {
            debug!(
                "应用环境变量覆盖: {} = {}",
                path,
                if path.contains("password") || path.contains("secret") {
                    "***"
                } else {
                    value
                }
            );

            Self::apply_override_to_config(config, path, value)?;
        }
        Ok(())
    }

    /// 将环境变量覆盖应用到配置对象
    fn apply_override_to_config(config: &mut AppConfig, path: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = path.split('.').collect();

        match parts.as_slice() {
            ["env"] | ["environment"] => {
                config.environment = Environment::parse(value)
                    .ok_or_else(|| ProxyError::config(format!("无效的运行环境: {value}")))?;
            }
            ["host"] | ["server", "host"] => config.server.host = value.to_string(),
            ["port"] | ["server", "port"] => {
                config.server.port = value.parse().map_err(|e| {
                    ProxyError::config_with_source(format!("无效的端口号: {value}"), e)
                })?;
            }
            ["upstream", "url"] | ["upstream", "base", "url"] => {
                config.upstream.base_url = value.to_string();
            }
            ["upstream", "timeout"] | ["upstream", "timeout", "secs"] => {
                config.upstream.timeout_secs = value.parse().map_err(|e| {
                    ProxyError::config_with_source(format!("无效的上游超时: {value}"), e)
                })?;
            }
            ["cookie", "secure"] => {
                config.cookie.secure = value.parse().map_err(|e| {
                    ProxyError::config_with_source(format!("无效的布尔值: {value}"), e)
                })?;
            }
            ["identity", "enabled"] => {
                config.identity.enabled = value.parse().map_err(|e| {
                    ProxyError::config_with_source(format!("无效的布尔值: {value}"), e)
                })?;
            }
            ["database", "url"] => config.database.url = value.to_string(),
            _ => {
                warn!("未知的配置路径，忽略环境变量覆盖: {}", path);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_overrides_applied() {
        let manager = ConfigManager::with_overrides(
            AppConfig::default(),
            &overrides(&[
                ("upstream.url", "https://auth.example.com"),
                ("env", "production"),
                ("port", "9000"),
            ]),
        )
        .unwrap();
        let config = manager.config();

        assert_eq!(config.upstream.base_url, "https://auth.example.com");
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.server.port, 9000);
        assert!(config.secure_cookies());
        assert_eq!(manager.overrides_applied(), 3);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let result = ConfigManager::with_overrides(
            AppConfig::default(),
            &overrides(&[("port", "not-a-port")]),
        );
        assert!(matches!(result, Err(ProxyError::Config { .. })));
    }

    #[test]
    fn test_override_is_validated() {
        let result = ConfigManager::with_overrides(
            AppConfig::default(),
            &overrides(&[("upstream.url", "ftp://legacy")]),
        );
        assert!(matches!(result, Err(ProxyError::Config { .. })));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = ConfigManager::from_file("/nonexistent/config.toml");
        assert!(matches!(result, Err(ProxyError::Config { .. })));
    }
}
