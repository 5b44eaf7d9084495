//! # 认证模块
//!
//! 旧身份库的密码哈希兼容层与直连访问。上游身份服务始终是权威来源，
//! 这里只提供本地查询与校验。

pub mod identity_store;
pub mod password;

pub use identity_store::{CredentialCheck, IdentityStore};
pub use password::{hash_password, needs_rehash, verify_password};
