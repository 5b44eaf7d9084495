//! 集成测试共用的上游模拟与应用构造

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use sea_orm::DatabaseConnection;
use session_bridge::{
    auth::IdentityStore,
    config::{AppConfig, DatabaseConfig},
    database,
    server::{AppState, create_app},
    session::Forwarder,
};
use wiremock::MockServer;

/// 形状合法的 32 位令牌
pub const CSRF_TOKEN: &str = "csrfTOKEN0123456789abcdefghijklm";

/// 测试中使用的 PBKDF2 迭代次数
pub const TEST_ITERATIONS: u32 = 1_000;

/// 指向模拟上游的配置
pub fn config_for(server: &MockServer) -> AppConfig {
    let mut config = AppConfig::default();
    config.upstream.base_url = server.uri();
    config.upstream.timeout_secs = 5;
    config.identity.hash_iterations = TEST_ITERATIONS;
    config
}

pub fn forwarder_for(server: &MockServer) -> Forwarder {
    Forwarder::new(&config_for(server)).expect("forwarder")
}

pub fn app_with(config: AppConfig, identity: Option<IdentityStore>) -> Router {
    create_app(AppState::new(Arc::new(config), identity).expect("state"))
}

/// 已迁移的内存身份库
pub async fn memory_db() -> DatabaseConnection {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        ..DatabaseConfig::default()
    };
    let db = database::init_database(&config).await.expect("connect");
    database::run_migrations(&db).await.expect("migrate");
    db
}

pub async fn memory_store() -> IdentityStore {
    IdentityStore::new(memory_db().await, TEST_ITERATIONS)
}
