//! # 路由配置

use axum::Router;
use axum::routing::{any, patch, post};

use super::app::AppState;
use super::handlers::{auth, passthrough};

/// 创建 `/api` 下的全部路由
///
/// 认证路由是静态路径，优先于 `{*resource}` 通配匹配。
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/register", post(auth::register))
        .route("/auth/password", post(auth::change_password))
        .route(
            "/auth/profile",
            patch(auth::update_profile).put(auth::update_profile),
        )
        .route("/auth/logout", post(auth::logout))
        .route("/{*resource}", any(passthrough::forward_resource))
        .with_state(state)
}
