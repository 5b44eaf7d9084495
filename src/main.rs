//! # Session Bridge 主程序
//!
//! 启动凭据代理：加载配置 → （可选）连接身份库 → 启动 HTTP 服务

use std::path::PathBuf;

use clap::Parser;
use session_bridge::{
    ProxyError, Result,
    auth::IdentityStore,
    config::{AppConfig, ConfigManager},
    database, lerror, linfo,
    logging::{self, LogComponent, LogStage},
    server::{AppState, BridgeServer},
};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(
    name = "session-bridge",
    version,
    about = "Credential proxy bridging bearer-token clients to a cookie + CSRF session backend"
)]
struct Cli {
    /// 配置文件路径（缺省读取 SESSION_BRIDGE_CONFIG_PATH，再按 RUST_ENV 选择 config/config.{env}.toml）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 日志级别（RUST_LOG 优先）
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level.as_deref());

    let config_manager = match &cli.config {
        Some(path) => ConfigManager::from_file(path)?,
        None => ConfigManager::new()?,
    };
    let config = config_manager.config();

    let identity = connect_identity_store(&config).await.map_err(|e| {
        lerror!(
            "system",
            LogStage::Startup,
            LogComponent::Database,
            "identity_init_failed",
            &format!("身份库初始化失败: {e}")
        );
        e
    })?;

    let state = AppState::new(config, identity)?;
    let server = BridgeServer::new(state)?;

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Main,
        "service_starting",
        &format!("服务启动: {}", server.bind_address())
    );
    server.serve().await?;

    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::Main,
        "service_shutdown",
        "服务正常关闭"
    );
    Ok(())
}

/// 启用身份库直连时建立连接并检查迁移状态
async fn connect_identity_store(config: &AppConfig) -> Result<Option<IdentityStore>> {
    if !config.identity.enabled {
        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Database,
            "identity_disabled",
            "身份库直连未启用"
        );
        return Ok(None);
    }

    let db = database::init_database(&config.database).await?;
    if config.database.run_migrations {
        database::run_migrations(&db)
            .await
            .map_err(|e| ProxyError::database_with_source("数据库迁移失败", e))?;
    } else if !database::check_database_status(&db).await? {
        return Err(ProxyError::config("身份库缺少 auth_user 表，请检查 database.url"));
    }

    Ok(Some(IdentityStore::new(db, config.identity.hash_iterations)))
}
