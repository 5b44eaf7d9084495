//! # 数据库模块
//!
//! 旧身份库的连接与（可选的）迁移管理

use std::path::Path;
use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::{MigratorTrait, SchemaManager};
use tracing::{debug, error, info, warn};

use crate::config::DatabaseConfig;
use crate::error::{ProxyError, Result};

/// 旧身份库的用户表
const USER_TABLE: &str = "auth_user";

/// 初始化数据库连接
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection> {
    info!(
        "正在连接身份库: {}",
        config.url.split('?').next().unwrap_or_default()
    );

    config.ensure_database_path()?;
    if config.is_sqlite() && !config.is_memory_database() {
        ensure_sqlite_file(&config.url)?;
    }

    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        .sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .map_err(|e| ProxyError::database_with_source("身份库连接失败", e))?;

    info!("身份库连接成功");
    Ok(db)
}

/// SQLite 文件不存在时创建空文件
fn ensure_sqlite_file(url: &str) -> Result<()> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
        .split('?')
        .next()
        .unwrap_or_default();
    let db_file_path = Path::new(path);

    if db_file_path.exists() {
        debug!("数据库文件已存在: {}", db_file_path.display());
    } else {
        std::fs::File::create(db_file_path)?;
        info!("数据库文件创建成功: {}", db_file_path.display());
    }
    Ok(())
}

/// 运行数据库迁移
pub async fn run_migrations(db: &DatabaseConnection) -> std::result::Result<(), DbErr> {
    info!("开始运行数据库迁移...");

    match ::migration::Migrator::up(db, None).await {
        Ok(()) => {
            info!("数据库迁移完成");
            Ok(())
        }
        Err(e) => {
            error!("数据库迁移失败: {}", e);
            Err(e)
        }
    }
}

/// 检查身份库状态
///
/// 只读检查：确认 `auth_user` 表存在，不安装迁移记录表，也不写入任何结构。
pub async fn check_database_status(db: &DatabaseConnection) -> std::result::Result<bool, DbErr> {
    let exists = SchemaManager::new(db).has_table(USER_TABLE).await?;

    if exists {
        info!("身份库表 {} 已存在", USER_TABLE);
    } else {
        warn!("身份库中缺少 {} 表", USER_TABLE);
    }
    Ok(exists)
}
