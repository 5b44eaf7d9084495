//! # HTTP 服务模块
//!
//! 认证路由与通用透传路由，把客户端请求交给会话桥接核心。

pub mod app;
pub mod handlers;
pub mod middleware;
pub mod routes;

pub use app::{AppState, BridgeServer, create_app};
pub use routes::create_routes;
