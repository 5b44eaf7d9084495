//! # 应用配置结构定义

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::DatabaseConfig;
use crate::error::Result;
use crate::ensure_config;

/// 运行环境
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    /// 解析环境名称，兼容 `dev` / `prod` 缩写
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Some(Self::Development),
            "test" => Some(Self::Test),
            "prod" | "production" => Some(Self::Production),
            _ => None,
        }
    }
}

/// 应用主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 运行环境
    pub environment: Environment,
    /// 监听配置
    pub server: ServerConfig,
    /// 上游身份/会话服务
    pub upstream: UpstreamConfig,
    /// CSRF 令牌探测
    pub csrf: CsrfConfig,
    /// 认证 Cookie 属性
    pub cookie: CookieConfig,
    /// 旧身份库直连
    pub identity: IdentityConfig,
    /// 数据库配置
    pub database: DatabaseConfig,
}

/// 监听配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 转发请求体的最大字节数
    pub max_body_bytes: usize,
    /// 是否启用CORS
    pub enable_cors: bool,
    /// 允许的CORS源地址（需要携带 Cookie，因此不支持 `*`）
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_bytes: 10 * 1024 * 1024,
            enable_cors: false,
            cors_origins: vec![],
        }
    }
}

/// 上游身份/会话服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// 上游根地址，例如 `https://backend.example.com`
    pub base_url: String,
    /// 单次上游请求超时（秒），同样约束每个 CSRF 探测候选
    pub timeout_secs: u64,
    /// 建连超时（秒）
    pub connect_timeout_secs: u64,
    /// 各认证路由对应的上游路径
    pub paths: UpstreamPaths,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout_secs: 10,
            connect_timeout_secs: 5,
            paths: UpstreamPaths::default(),
        }
    }
}

impl UpstreamConfig {
    /// 单次请求超时
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// 建连超时
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// 认证路由对应的上游路径
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamPaths {
    /// 登录
    pub login: String,
    /// 注册
    pub register: String,
    /// 注销
    pub logout: String,
    /// 修改密码
    pub password_change: String,
    /// 用户资料
    pub profile: String,
    /// 通用透传 `/api/{resource}` 在上游的前缀
    pub resource_prefix: String,
}

impl Default for UpstreamPaths {
    fn default() -> Self {
        Self {
            login: "/api/auth/login/".to_string(),
            register: "/api/auth/register/".to_string(),
            logout: "/api/auth/logout/".to_string(),
            password_change: "/api/auth/password/change/".to_string(),
            profile: "/api/auth/user/".to_string(),
            resource_prefix: "/api".to_string(),
        }
    }
}

/// CSRF 令牌探测配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// 候选端点，按顺序探测：主路径在前，历史路径在后
    pub candidate_paths: Vec<String>,
    /// 允许的令牌长度
    pub token_lengths: Vec<usize>,
    /// 承载令牌的 Cookie 名
    pub cookie_name: String,
    /// 响应体中可能承载令牌的 JSON 字段
    pub body_fields: Vec<String>,
    /// 响应头中可能承载令牌的头名
    pub response_headers: Vec<String>,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            candidate_paths: vec![
                "/api/auth/csrf/".to_string(),
                "/api/csrf/".to_string(),
                "/auth/csrf/".to_string(),
                "/csrf/".to_string(),
            ],
            token_lengths: vec![32, 64],
            cookie_name: "csrftoken".to_string(),
            body_fields: vec![
                "csrfToken".to_string(),
                "csrf_token".to_string(),
                "csrftoken".to_string(),
            ],
            response_headers: vec!["x-csrftoken".to_string(), "x-csrf-token".to_string()],
        }
    }
}

/// 认证 Cookie 配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    /// 显式开启 `Secure`；生产环境无论如何都会开启
    pub secure: bool,
    /// `auth_token` 的 `Max-Age`（秒），缺省为会话 Cookie
    pub max_age_secs: Option<u64>,
}

/// 旧身份库直连配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// 是否启用身份库直连
    pub enabled: bool,
    /// 本地校验明确失败时直接拒绝登录，不再请求上游
    pub enforce_local_credentials: bool,
    /// 新哈希使用的 PBKDF2 迭代次数
    pub hash_iterations: u32,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            enforce_local_credentials: false,
            hash_iterations: crate::auth::password::DEFAULT_ITERATIONS,
        }
    }
}

impl AppConfig {
    /// 最终生效的 `Secure` 属性
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.cookie.secure || self.environment == Environment::Production
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        ensure_config!(self.server.port != 0, "无效的服务器端口: 0");
        ensure_config!(self.server.max_body_bytes > 0, "max_body_bytes 必须大于0");

        let base = url::Url::parse(&self.upstream.base_url).map_err(|e| {
            crate::error::ProxyError::config_with_source(
                format!("无效的上游地址: {}", self.upstream.base_url),
                e,
            )
        })?;
        ensure_config!(
            matches!(base.scheme(), "http" | "https"),
            "上游地址必须是 http(s): {}",
            self.upstream.base_url
        );
        ensure_config!(self.upstream.timeout_secs > 0, "上游超时必须大于0秒");
        ensure_config!(
            !self.upstream.paths.resource_prefix.ends_with('/'),
            "resource_prefix 不能以 / 结尾"
        );

        ensure_config!(
            !self.csrf.candidate_paths.is_empty(),
            "至少需要一个 CSRF 候选端点"
        );
        ensure_config!(
            self.csrf.candidate_paths.iter().all(|p| p.starts_with('/')),
            "CSRF 候选端点必须以 / 开头"
        );
        ensure_config!(
            !self.csrf.token_lengths.is_empty() && !self.csrf.token_lengths.contains(&0),
            "CSRF 令牌长度列表不能为空或包含0"
        );

        ensure_config!(
            self.identity.hash_iterations > 0,
            "PBKDF2 迭代次数必须大于0"
        );
        if self.identity.enabled {
            ensure_config!(!self.database.url.is_empty(), "启用身份库时数据库URL不能为空");
            ensure_config!(self.database.max_connections > 0, "数据库最大连接数必须大于0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.csrf.token_lengths, vec![32, 64]);
        assert_eq!(config.csrf.candidate_paths.len(), 4);
        assert!(!config.secure_cookies());
    }

    #[test]
    fn test_production_forces_secure_cookies() {
        let config = AppConfig {
            environment: Environment::Production,
            ..AppConfig::default()
        };
        assert!(config.secure_cookies());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            environment = "production"

            [upstream]
            base_url = "https://backend.example.com"

            [csrf]
            token_lengths = [32]
            "#,
        )
        .unwrap();

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.upstream.base_url, "https://backend.example.com");
        assert_eq!(config.upstream.timeout_secs, 10);
        assert_eq!(config.csrf.token_lengths, vec![32]);
        assert_eq!(config.csrf.cookie_name, "csrftoken");
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_upstream_rejected() {
        let mut config = AppConfig::default();
        config.upstream.base_url = "ftp://backend".to_string();
        assert!(config.validate().is_err());

        config.upstream.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("prod"), Some(Environment::Production));
        assert_eq!(Environment::parse("Development"), Some(Environment::Development));
        assert_eq!(Environment::parse("staging"), None);
    }
}
