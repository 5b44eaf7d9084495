//! # 路由处理器
//!
//! 处理器只负责拼装 `MediatedRequest` 与上游目标，转发逻辑全部在 `session` 中。

pub mod auth;
pub mod passthrough;
pub mod system;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::app::AppState;
use crate::error::{ErrorCategory, ProxyError};
use crate::lerror;
use crate::logging::{LogComponent, LogStage};
use crate::session::{ForwardTarget, MediatedRequest};

/// `{success:false, message}` 形式的错误响应
#[must_use]
pub fn failure_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "message": message }))).into_response()
}

/// 转发并把结果转成响应；错误走统一的错误响应
async fn forward_and_respond(
    state: &AppState,
    request_id: &str,
    request: &MediatedRequest,
    target: &ForwardTarget,
) -> Response {
    match state.forwarder().forward(request_id, request, target).await {
        Ok(outcome) => outcome.into_response(),
        Err(e) => error_response(request_id, e),
    }
}

fn error_response(request_id: &str, error: ProxyError) -> Response {
    if error.category() == ErrorCategory::Server {
        lerror!(
            request_id,
            LogStage::ResponseFailure,
            LogComponent::Handler,
            "request_failed",
            "请求处理失败",
            error = %error
        );
    }
    error.into_response()
}
