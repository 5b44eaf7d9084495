//! # 旧身份库访问
//!
//! 直接读写关系型身份库的 `auth_user` 表。每个操作都是独立的单条语句，
//! 不使用事务。

use chrono::Utc;
use entity::users;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use tracing::{debug, info, warn};

use super::password::{hash_password, needs_rehash, verify_password};
use crate::error::{ProxyError, Result};

/// 本地凭据校验结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialCheck {
    /// 用户不存在
    Unknown,
    /// 密码不匹配（包括存储的哈希无法解析）
    Mismatch,
    /// 用户已停用
    Inactive,
    Verified(users::Model),
}

impl CredentialCheck {
    /// 明确的失败（用户存在但凭据无效）
    #[must_use]
    pub const fn is_definite_failure(&self) -> bool {
        matches!(self, Self::Mismatch | Self::Inactive)
    }
}

/// 身份库
#[derive(Debug, Clone)]
pub struct IdentityStore {
    db: DatabaseConnection,
    hash_iterations: u32,
}

impl IdentityStore {
    /// `hash_iterations` 用于新写入的哈希
    #[must_use]
    pub const fn new(db: DatabaseConnection, hash_iterations: u32) -> Self {
        Self {
            db,
            hash_iterations,
        }
    }

    /// 底层数据库连接
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// 按用户名查找
    pub async fn find_by_username(&self, username: &str) -> Result<Option<users::Model>> {
        Ok(users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.db)
            .await?)
    }

    /// 按邮箱查找
    pub async fn find_by_email(&self, email: &str) -> Result<Option<users::Model>> {
        Ok(users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.db)
            .await?)
    }

    /// 按用户名查找，找不到且输入像邮箱时再按邮箱查找
    pub async fn find_by_login(&self, login: &str) -> Result<Option<users::Model>> {
        if let Some(user) = self.find_by_username(login).await? {
            return Ok(Some(user));
        }
        if login.contains('@') {
            return self.find_by_email(login).await;
        }
        Ok(None)
    }

    /// 新建用户，密码以旧格式哈希保存
    pub async fn create_user(&self, username: &str, email: &str, password: &str) -> Result<users::Model> {
        if username.trim().is_empty() {
            return Err(ProxyError::business("用户名不能为空"));
        }
        if self.find_by_username(username).await?.is_some() {
            return Err(ProxyError::business(format!("用户名已存在: {username}")));
        }

        let user = users::ActiveModel {
            username: Set(username.to_string()),
            email: Set(email.to_string()),
            password: Set(hash_password(password, self.hash_iterations)),
            is_active: Set(true),
            last_login: Set(None),
            date_joined: Set(Utc::now().naive_utc()),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .map_err(|e| ProxyError::database_with_source("创建用户失败", e))?;

        info!(component = "identity_store", user_id = user.id, "已创建用户");
        Ok(user)
    }

    /// 更新密码哈希
    pub async fn set_password(&self, user_id: i32, password: &str) -> Result<()> {
        let result = users::Entity::update_many()
            .col_expr(
                users::Column::Password,
                sea_orm::sea_query::Expr::value(hash_password(password, self.hash_iterations)),
            )
            .filter(users::Column::Id.eq(user_id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ProxyError::business(format!("用户不存在: {user_id}")));
        }
        debug!(component = "identity_store", user_id, "已更新密码哈希");
        Ok(())
    }

    /// 记录最近登录时间
    pub async fn touch_last_login(&self, user_id: i32) -> Result<()> {
        users::Entity::update_many()
            .col_expr(
                users::Column::LastLogin,
                sea_orm::sea_query::Expr::value(Some(Utc::now().naive_utc())),
            )
            .filter(users::Column::Id.eq(user_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// 校验用户名（或邮箱）与密码
    ///
    /// 存储的哈希无效时视为不匹配，不返回错误。校验通过且迭代次数过低时顺带重新哈希。
    pub async fn verify_credentials(&self, login: &str, password: &str) -> Result<CredentialCheck> {
        let Some(user) = self.find_by_login(login).await? else {
            return Ok(CredentialCheck::Unknown);
        };
        if !verify_password(password, &user.password) {
            return Ok(CredentialCheck::Mismatch);
        }
        if !user.is_active {
            return Ok(CredentialCheck::Inactive);
        }

        if needs_rehash(&user.password, self.hash_iterations) {
            if let Err(e) = self.set_password(user.id, password).await {
                warn!(component = "identity_store", user_id = user.id, error = %e, "重新哈希失败");
            }
        }
        Ok(CredentialCheck::Verified(user))
    }
}
