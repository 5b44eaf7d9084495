//! # Session Bridge
//!
//! 无状态令牌客户端与 Cookie + CSRF 上游会话服务之间的凭据代理核心库

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod server;
pub mod session;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{ProxyError, Result};
