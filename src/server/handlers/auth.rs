//! # 认证处理器
//!
//! 登录、注册、改密、资料更新、注销。全部转发到上游身份服务；
//! 启用身份库直连时，额外做本地校验与数据同步（上游结果始终优先）。

use axum::{
    Extension,
    extract::State,
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{error_response, failure_response, forward_and_respond};
use crate::auth::{CredentialCheck, IdentityStore};
use crate::logging::{LogComponent, LogStage};
use crate::server::app::AppState;
use crate::server::middleware::RequestId;
use crate::session::{ForwardOutcome, ForwardTarget, MediatedRequest};
use crate::{ldebug, lerror, linfo, lwarn};

/// 登录链路本地失败时的提示
pub const LOGIN_UNAVAILABLE_MESSAGE: &str = "Login failed: authentication service unavailable";

/// 本地凭据明确无效时的提示
const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid username or password";

/// 请求体中的凭据字段
#[derive(Debug, Default, Deserialize)]
struct Credentials {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default, alias = "password1")]
    password: Option<String>,
    #[serde(default, alias = "new_password1", alias = "newPassword")]
    new_password: Option<String>,
}

impl Credentials {
    fn from_body(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    /// 用于查找本地用户的标识：用户名优先，其次邮箱
    fn login(&self) -> Option<&str> {
        [self.username.as_deref(), self.email.as_deref()]
            .into_iter()
            .flatten()
            .find(|v| !v.trim().is_empty())
    }
}

/// 登录失败状态码对应的用户提示
#[must_use]
pub fn login_failure_message(status: StatusCode) -> Option<&'static str> {
    match status.as_u16() {
        400 => Some(INVALID_CREDENTIALS_MESSAGE),
        401 => Some("Authentication failed. Please check your credentials."),
        404 => Some("Account not found"),
        429 => Some("Too many login attempts. Please try again later."),
        500..=599 => Some("Authentication service error. Please try again later."),
        _ => None,
    }
}

/// 改写登录失败响应体
///
/// 上游已经给出 `message` 时保留原文；原始状态码写入 `status` 字段。
/// 不在翻译范围内的状态码返回 `None`，响应原样透传。
#[must_use]
pub fn translate_login_failure(status: StatusCode, body: &[u8]) -> Option<Value> {
    let message = login_failure_message(status)?;
    let mut value = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Value::Object(map),
        _ => json!({ "success": false }),
    };

    let has_message = value
        .get("message")
        .and_then(Value::as_str)
        .is_some_and(|m| !m.trim().is_empty());
    if !has_message {
        value["message"] = json!(message);
    }
    value["status"] = json!(status.as_u16());
    if value.get("success").is_none() {
        value["success"] = json!(false);
    }
    Some(value)
}

/// `POST /api/auth/login`
pub async fn login(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let credentials = Credentials::from_body(&body);
    let local_check = match state.identity() {
        Some(store) => check_local_credentials(store, &request_id, &credentials).await,
        None => None,
    };

    if state.config().identity.enforce_local_credentials
        && local_check
            .as_ref()
            .is_some_and(CredentialCheck::is_definite_failure)
    {
        linfo!(
            request_id,
            LogStage::Authentication,
            LogComponent::Handler,
            "login_rejected_locally",
            "本地凭据校验失败，未请求上游"
        );
        let body = json!({
            "success": false,
            "message": INVALID_CREDENTIALS_MESSAGE,
            "status": StatusCode::BAD_REQUEST.as_u16(),
        });
        return (StatusCode::BAD_REQUEST, axum::Json(body)).into_response();
    }

    let request = MediatedRequest::new(method, headers, body);
    let target = ForwardTarget::session(&state.config().upstream.paths.login);
    let outcome = match state.forwarder().forward(&request_id, &request, &target).await {
        Ok(outcome) => outcome,
        Err(e) => {
            lerror!(
                request_id,
                LogStage::ResponseFailure,
                LogComponent::Handler,
                "login_failed",
                "登录转发失败",
                error = %e
            );
            return failure_response(StatusCode::INTERNAL_SERVER_ERROR, LOGIN_UNAVAILABLE_MESSAGE);
        }
    };

    if outcome.is_success() {
        if let Some(store) = state.identity() {
            record_login(store, &request_id, &credentials, local_check).await;
        }
        return outcome.into_response();
    }

    match translate_login_failure(outcome.status, &outcome.body) {
        Some(body) => {
            ldebug!(
                request_id,
                LogStage::Response,
                LogComponent::Handler,
                "login_failure_translated",
                "登录失败响应已补充提示",
                status = outcome.status.as_u16()
            );
            outcome.with_json_body(&body).into_response()
        }
        None => outcome.into_response(),
    }
}

/// `POST /api/auth/register`
pub async fn register(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let credentials = Credentials::from_body(&body);
    let request = MediatedRequest::new(method, headers, body);
    let target = ForwardTarget::session(&state.config().upstream.paths.register);

    let outcome = match state.forwarder().forward(&request_id, &request, &target).await {
        Ok(outcome) => outcome,
        Err(e) => return error_response(&request_id, e),
    };

    if let Some(store) = state.identity().filter(|_| outcome.is_success()) {
        mirror_registration(store, &request_id, &credentials).await;
    }
    outcome.into_response()
}

/// `POST /api/auth/password`
pub async fn change_password(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let credentials = Credentials::from_body(&body);
    let request = MediatedRequest::new(method, headers, body);
    let target = ForwardTarget::session(&state.config().upstream.paths.password_change);

    let outcome = match state.forwarder().forward(&request_id, &request, &target).await {
        Ok(outcome) => outcome,
        Err(e) => return error_response(&request_id, e),
    };

    if let Some(store) = state.identity().filter(|_| outcome.is_success()) {
        sync_password(store, &request_id, &credentials, &outcome).await;
    }
    outcome.into_response()
}

/// `PUT|PATCH /api/auth/profile`
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = MediatedRequest::new(method, headers, body);
    let target = ForwardTarget::resource(&state.config().upstream.paths.profile);
    forward_and_respond(&state, &request_id, &request, &target).await
}

/// `POST /api/auth/logout`
///
/// 无论上游返回什么状态，都下发清除 `auth_token` 的 Cookie。
pub async fn logout(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = MediatedRequest::new(method, headers, body);
    let target = ForwardTarget::resource(&state.config().upstream.paths.logout);

    match state.forwarder().forward(&request_id, &request, &target).await {
        Ok(mut outcome) => {
            outcome
                .set_cookies
                .push(state.forwarder().rotator().expire());
            outcome.into_response()
        }
        Err(e) => error_response(&request_id, e),
    }
}

/// 本地凭据校验；身份库异常只记日志，返回 `None`
async fn check_local_credentials(
    store: &IdentityStore,
    request_id: &str,
    credentials: &Credentials,
) -> Option<CredentialCheck> {
    let (Some(login), Some(password)) = (credentials.login(), credentials.password.as_deref())
    else {
        return None;
    };

    match store.verify_credentials(login, password).await {
        Ok(check) => {
            ldebug!(
                request_id,
                LogStage::Authentication,
                LogComponent::IdentityStore,
                "local_check",
                "本地凭据校验完成",
                result = local_check_label(&check)
            );
            Some(check)
        }
        Err(e) => {
            lwarn!(
                request_id,
                LogStage::Db,
                LogComponent::IdentityStore,
                "local_check_failed",
                "身份库不可用，跳过本地校验",
                error = %e
            );
            None
        }
    }
}

const fn local_check_label(check: &CredentialCheck) -> &'static str {
    match check {
        CredentialCheck::Unknown => "unknown",
        CredentialCheck::Mismatch => "mismatch",
        CredentialCheck::Inactive => "inactive",
        CredentialCheck::Verified(_) => "verified",
    }
}

async fn record_login(
    store: &IdentityStore,
    request_id: &str,
    credentials: &Credentials,
    local_check: Option<CredentialCheck>,
) {
    let user_id = if let Some(CredentialCheck::Verified(user)) = local_check {
        Some(user.id)
    } else if let Some(login) = credentials.login() {
        store.find_by_login(login).await.ok().flatten().map(|u| u.id)
    } else {
        None
    };

    let Some(user_id) = user_id else {
        return;
    };
    if let Err(e) = store.touch_last_login(user_id).await {
        lwarn!(
            request_id,
            LogStage::Db,
            LogComponent::IdentityStore,
            "touch_last_login_failed",
            "更新最近登录时间失败",
            error = %e
        );
    }
}

async fn mirror_registration(store: &IdentityStore, request_id: &str, credentials: &Credentials) {
    let (Some(username), Some(password)) = (
        credentials.username.as_deref().filter(|v| !v.trim().is_empty()),
        credentials.password.as_deref(),
    ) else {
        return;
    };

    match store.find_by_username(username).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            let email = credentials.email.as_deref().unwrap_or_default();
            if let Err(e) = store.create_user(username, email, password).await {
                lwarn!(
                    request_id,
                    LogStage::Db,
                    LogComponent::IdentityStore,
                    "mirror_failed",
                    "注册用户同步到身份库失败",
                    error = %e
                );
            }
        }
        Err(e) => {
            lwarn!(
                request_id,
                LogStage::Db,
                LogComponent::IdentityStore,
                "mirror_failed",
                "查询身份库失败",
                error = %e
            );
        }
    }
}

/// 上游改密成功后同步本地哈希
///
/// 用户标识依次取自请求体（`username` / `email`）和响应体（`user.username` / `username`）。
async fn sync_password(
    store: &IdentityStore,
    request_id: &str,
    credentials: &Credentials,
    outcome: &ForwardOutcome,
) {
    let Some(new_password) = credentials.new_password.as_deref() else {
        return;
    };
    let response_login = outcome.json().ok().and_then(|body| {
        body.pointer("/user/username")
            .or_else(|| body.get("username"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    let Some(login) = credentials
        .login()
        .map(str::to_string)
        .or(response_login)
    else {
        ldebug!(
            request_id,
            LogStage::Db,
            LogComponent::IdentityStore,
            "password_sync_skipped",
            "无法确定用户，跳过本地密码同步"
        );
        return;
    };

    let result = match store.find_by_login(&login).await {
        Ok(Some(user)) => store.set_password(user.id, new_password).await,
        Ok(None) => return,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        lwarn!(
            request_id,
            LogStage::Db,
            LogComponent::IdentityStore,
            "password_sync_failed",
            "本地密码同步失败",
            error = %e
        );
    }
}
