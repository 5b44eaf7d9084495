//! # Entity 模块
//!
//! 旧身份库的 Sea-ORM 实体定义

pub mod users;

pub use users::Entity as Users;
