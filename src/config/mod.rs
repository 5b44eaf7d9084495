//! # 配置管理模块
//!
//! 启动时加载一次、之后只读的应用配置；通过 `Arc<AppConfig>` 注入各组件。

mod app_config;
mod database;
mod manager;

pub use app_config::{
    AppConfig, CookieConfig, CsrfConfig, Environment, IdentityConfig, ServerConfig,
    UpstreamConfig, UpstreamPaths,
};
pub use database::DatabaseConfig;
pub use manager::ConfigManager;
