//! # 用户实体定义
//!
//! 旧身份库 `auth_user` 表的 Sea-ORM 实体模型。
//! `password` 列保存 `pbkdf2_sha256$<iterations>$<salt>$<digest>` 格式的哈希。

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 用户实体
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "auth_user")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub username: String,
    pub email: String,
    /// 旧格式密码哈希，永远不要序列化给客户端
    #[serde(skip_serializing)]
    pub password: String,
    pub is_active: bool,
    pub last_login: Option<DateTime>,
    pub date_joined: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
