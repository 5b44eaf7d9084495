//! 身份库（`auth_user`）读写与凭据校验测试

mod common;

use common::{TEST_ITERATIONS, memory_db, memory_store};
use entity::users;
use pretty_assertions::assert_eq;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use session_bridge::ProxyError;
use session_bridge::auth::{CredentialCheck, IdentityStore, verify_password};

#[tokio::test]
async fn test_create_and_find_user() {
    let store = memory_store().await;
    let created = store
        .create_user("alice", "alice@example.com", "s3cret")
        .await
        .unwrap();

    assert!(created.is_active);
    assert!(created.last_login.is_none());
    assert!(
        created
            .password
            .starts_with(&format!("pbkdf2_sha256${TEST_ITERATIONS}$"))
    );
    assert!(verify_password("s3cret", &created.password));

    let by_name = store.find_by_username("alice").await.unwrap().unwrap();
    assert_eq!(by_name.id, created.id);
    let by_email = store.find_by_email("alice@example.com").await.unwrap().unwrap();
    assert_eq!(by_email.id, created.id);
    let by_login = store.find_by_login("alice@example.com").await.unwrap().unwrap();
    assert_eq!(by_login.id, created.id);
    assert!(store.find_by_login("nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_and_empty_usernames_rejected() {
    let store = memory_store().await;
    store.create_user("alice", "", "pw").await.unwrap();

    let duplicate = store.create_user("alice", "", "pw").await.unwrap_err();
    assert!(matches!(duplicate, ProxyError::Business { .. }));

    let empty = store.create_user("  ", "", "pw").await.unwrap_err();
    assert!(matches!(empty, ProxyError::Business { .. }));
}

#[tokio::test]
async fn test_verify_credentials_outcomes() {
    let store = memory_store().await;
    let user = store
        .create_user("bob", "bob@example.com", "hunter2")
        .await
        .unwrap();

    assert!(matches!(
        store.verify_credentials("bob", "hunter2").await.unwrap(),
        CredentialCheck::Verified(ref verified) if verified.id == user.id
    ));
    assert_eq!(
        store.verify_credentials("bob@example.com", "wrong").await.unwrap(),
        CredentialCheck::Mismatch
    );
    assert_eq!(
        store.verify_credentials("carol", "hunter2").await.unwrap(),
        CredentialCheck::Unknown
    );

    let mut inactive: users::ActiveModel = user.into();
    inactive.is_active = Set(false);
    inactive.update(store.connection()).await.unwrap();
    assert_eq!(
        store.verify_credentials("bob", "hunter2").await.unwrap(),
        CredentialCheck::Inactive
    );
    // 停用账号在密码错误时仍报告不匹配
    assert_eq!(
        store.verify_credentials("bob", "nope").await.unwrap(),
        CredentialCheck::Mismatch
    );
}

#[tokio::test]
async fn test_malformed_stored_hash_is_mismatch() {
    let store = memory_store().await;
    let user = store.create_user("dave", "", "pw").await.unwrap();

    let mut broken: users::ActiveModel = user.into();
    broken.password = Set("md5$deadbeef".to_string());
    broken.update(store.connection()).await.unwrap();

    assert_eq!(
        store.verify_credentials("dave", "pw").await.unwrap(),
        CredentialCheck::Mismatch
    );
}

#[tokio::test]
async fn test_set_password_and_touch_last_login() {
    let store = memory_store().await;
    let user = store.create_user("erin", "", "old").await.unwrap();

    store.set_password(user.id, "new").await.unwrap();
    assert_eq!(
        store.verify_credentials("erin", "old").await.unwrap(),
        CredentialCheck::Mismatch
    );
    assert!(matches!(
        store.verify_credentials("erin", "new").await.unwrap(),
        CredentialCheck::Verified(_)
    ));

    let missing = store.set_password(user.id + 100, "x").await.unwrap_err();
    assert!(matches!(missing, ProxyError::Business { .. }));

    store.touch_last_login(user.id).await.unwrap();
    let reloaded = users::Entity::find_by_id(user.id)
        .one(store.connection())
        .await
        .unwrap()
        .unwrap();
    assert!(reloaded.last_login.is_some());
}

#[tokio::test]
async fn test_weak_hash_upgraded_on_successful_login() {
    let db = memory_db().await;
    let weak = IdentityStore::new(db.clone(), 500);
    let user = weak.create_user("frank", "", "pw").await.unwrap();
    assert!(user.password.starts_with("pbkdf2_sha256$500$"));

    let strong = IdentityStore::new(db, TEST_ITERATIONS);
    assert!(matches!(
        strong.verify_credentials("frank", "pw").await.unwrap(),
        CredentialCheck::Verified(_)
    ));

    let reloaded = strong.find_by_username("frank").await.unwrap().unwrap();
    assert!(
        reloaded
            .password
            .starts_with(&format!("pbkdf2_sha256${TEST_ITERATIONS}$"))
    );
    assert!(verify_password("pw", &reloaded.password));
}
