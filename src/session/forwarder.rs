//! # 通用转发器
//!
//! 完整的一次代理周期：按需获取 CSRF 令牌 → 构建请求头 → 协商请求体 →
//! 调用上游 → 204 短路 → 认证 Cookie 轮换 → 透传响应。
//! 每次调用各自持有 Cookie Jar 与 `Set-Cookie` 累加器，不共享可变状态。

use std::time::Instant;

use axum::{
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde_json::Value;

use super::csrf::{CsrfAcquisition, CsrfBroker};
use super::headers::{ForwardHeaderBuilder, ForwardHeaderOptions};
use super::request::{BodyKind, ForwardTarget, MediatedRequest, TargetKind};
use super::response::build_passthrough;
use super::rotator::AuthCookieRotator;
use super::upstream::{UpstreamClient, collect_set_cookies};
use crate::config::AppConfig;
use crate::error::{BodyParseError, ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lerror, linfo, lwarn};

/// 一次转发的结果，交给路由处理器前尚未定型为 HTTP 响应
#[derive(Debug, Clone)]
pub struct ForwardOutcome {
    /// 上游状态码（204 已改写为 200）
    pub status: StatusCode,
    /// 上游 `Content-Type`
    pub content_type: Option<String>,
    /// 原始响应体
    pub body: Bytes,
    /// 探测、上游响应、合成 Cookie 依次累加
    pub set_cookies: Vec<String>,
}

impl ForwardOutcome {
    /// 上游 204 时的合成成功响应
    #[must_use]
    pub fn empty_success(set_cookies: Vec<String>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: Some("application/json".to_string()),
            body: Bytes::from_static(br#"{"success":true}"#),
            set_cookies,
        }
    }

    /// 状态码是否为 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// 把响应体解析为 JSON
    pub fn json(&self) -> std::result::Result<Value, BodyParseError> {
        if self.body.is_empty() {
            return Err(BodyParseError::Empty);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// 用新的 JSON 替换响应体，状态码与 Cookie 保持不变
    #[must_use]
    pub fn with_json_body(mut self, body: &Value) -> Self {
        self.body = Bytes::from(body.to_string());
        self.content_type = Some("application/json".to_string());
        self
    }
}

impl IntoResponse for ForwardOutcome {
    fn into_response(self) -> Response {
        build_passthrough(
            self.status,
            self.content_type.as_deref(),
            self.body,
            &self.set_cookies,
        )
    }
}

/// 通用转发器
#[derive(Debug, Clone)]
pub struct Forwarder {
    upstream: UpstreamClient,
    broker: CsrfBroker,
    headers: ForwardHeaderBuilder,
    rotator: AuthCookieRotator,
}

impl Forwarder {
    /// 按应用配置组装各组件
    pub fn new(config: &AppConfig) -> Result<Self> {
        let upstream = UpstreamClient::new(&config.upstream)?;
        let broker = CsrfBroker::new(upstream.clone(), config.csrf.clone());
        let headers = ForwardHeaderBuilder::new(broker.shape().clone(), config.csrf.cookie_name.clone());
        Ok(Self {
            upstream,
            broker,
            headers,
            rotator: AuthCookieRotator::from_config(config),
        })
    }

    /// 认证 Cookie 签发器
    #[must_use]
    pub const fn rotator(&self) -> &AuthCookieRotator {
        &self.rotator
    }

    /// 执行一次转发
    ///
    /// 上游不可达时返回 `BadGateway` / `ConnectionTimeout`，不重试。
    pub async fn forward(
        &self,
        request_id: &str,
        request: &MediatedRequest,
        target: &ForwardTarget,
    ) -> Result<ForwardOutcome> {
        let start = Instant::now();
        let method = request.method().clone();

        let CsrfAcquisition {
            token,
            new_set_cookies,
        } = if request.method_kind().is_mutating() {
            self.broker
                .acquire(request_id, request.cookie_header().as_deref())
                .await
        } else {
            CsrfAcquisition::default()
        };
        let mut set_cookies = new_set_cookies;

        let headers = self.headers.build(
            request,
            &ForwardHeaderOptions {
                csrf_token: token.as_deref(),
                content_type: None,
                extra_set_cookies: &set_cookies,
            },
        );

        let body = match negotiate_body(request) {
            Ok(body) => body,
            Err(e) => {
                lwarn!(
                    request_id,
                    LogStage::RequestModify,
                    LogComponent::Forwarder,
                    "body_dropped",
                    "请求体解析失败，转发时不携带请求体",
                    error = %e
                );
                None
            }
        };

        ldebug!(
            request_id,
            LogStage::UpstreamRequest,
            LogComponent::Forwarder,
            "forward",
            "转发请求到上游",
            method = %method,
            path = %target.path,
            csrf = token.is_some(),
            has_body = body.is_some()
        );

        let mut upstream_request = self.upstream.request(method.clone(), &target.path).headers(headers);
        if let Some(body) = body {
            upstream_request = upstream_request.body(body);
        }

        let response = match self.upstream.send(upstream_request).await {
            Ok(response) => response,
            Err(e) => {
                lerror!(
                    request_id,
                    LogStage::ResponseFailure,
                    LogComponent::Forwarder,
                    "upstream_unreachable",
                    "上游请求失败",
                    path = %target.path,
                    error = %e
                );
                return Err(e);
            }
        };

        let status = response.status();
        set_cookies.extend(collect_set_cookies(response.headers()));

        if status == StatusCode::NO_CONTENT {
            linfo!(
                request_id,
                LogStage::Response,
                LogComponent::Forwarder,
                "no_content",
                "上游返回204，改写为成功响应",
                path = %target.path,
                cookies = set_cookies.len(),
                elapsed = ?start.elapsed()
            );
            return Ok(ForwardOutcome::empty_success(set_cookies));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|e| {
            ProxyError::bad_gateway_with_source(format!("读取上游响应失败: {}", target.path), e)
        })?;

        if target.kind == TargetKind::Session && method == Method::POST {
            let minted = self.rotator.extract(&body, status.is_success());
            if !minted.is_empty() {
                ldebug!(
                    request_id,
                    LogStage::Authentication,
                    LogComponent::AuthCookie,
                    "rotate",
                    "已签发认证Cookie"
                );
            }
            set_cookies.extend(minted);
        }

        linfo!(
            request_id,
            LogStage::Response,
            LogComponent::Forwarder,
            "relay",
            "上游响应已透传",
            path = %target.path,
            status = status.as_u16(),
            cookies = set_cookies.len(),
            elapsed = ?start.elapsed()
        );

        Ok(ForwardOutcome {
            status,
            content_type,
            body,
            set_cookies,
        })
    }
}

/// 按方法与内容类型决定发往上游的请求体
///
/// JSON 解析后重新序列化；multipart 与其余类型按原始字节透传，不做编码校验。
fn negotiate_body(request: &MediatedRequest) -> std::result::Result<Option<Bytes>, BodyParseError> {
    if matches!(*request.method(), Method::GET | Method::HEAD | Method::DELETE) {
        return Ok(None);
    }
    let raw = request.body();
    if raw.is_empty() {
        return Ok(None);
    }

    match BodyKind::from_content_type(request.content_type()) {
        BodyKind::Json => {
            let value: Value = serde_json::from_slice(raw)?;
            Ok(Some(Bytes::from(value.to_string())))
        }
        BodyKind::Multipart | BodyKind::Text => Ok(Some(raw.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn request(method: Method, content_type: Option<&'static str>, body: &'static [u8]) -> MediatedRequest {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(ct));
        }
        MediatedRequest::new(method, headers, Bytes::from_static(body))
    }

    #[test]
    fn test_no_body_for_get_head_delete() {
        for method in [Method::GET, Method::HEAD, Method::DELETE] {
            let req = request(method, Some("application/json"), br#"{"a":1}"#);
            assert_eq!(negotiate_body(&req).unwrap(), None);
        }
    }

    #[test]
    fn test_json_is_reserialized() {
        let req = request(Method::POST, Some("application/json"), b"{ \"a\" : 1 }");
        assert_eq!(
            negotiate_body(&req).unwrap(),
            Some(Bytes::from_static(br#"{"a":1}"#))
        );
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let req = request(Method::POST, Some("application/json"), b"{not json");
        assert!(matches!(negotiate_body(&req), Err(BodyParseError::Json(_))));
    }

    #[test]
    fn test_multipart_passthrough() {
        let raw: &'static [u8] = b"------x\r\nContent-Disposition: form-data; name=\"f\"\r\n\r\n\xff\xfe\r\n------x--";
        let req = request(Method::POST, Some("multipart/form-data; boundary=----x"), raw);
        assert_eq!(negotiate_body(&req).unwrap(), Some(Bytes::from_static(raw)));
    }

    #[test]
    fn test_text_passthrough() {
        let req = request(Method::PUT, Some("application/x-www-form-urlencoded"), b"a=1&b=2");
        assert_eq!(
            negotiate_body(&req).unwrap(),
            Some(Bytes::from_static(b"a=1&b=2"))
        );
        let req = request(Method::PATCH, None, b"\xff\xfe");
        assert_eq!(
            negotiate_body(&req).unwrap(),
            Some(Bytes::from_static(b"\xff\xfe"))
        );
    }

    #[test]
    fn test_outcome_json_helpers() {
        let outcome = ForwardOutcome::empty_success(vec!["a=1".to_string()]);
        assert_eq!(outcome.status, StatusCode::OK);
        assert_eq!(outcome.json().unwrap(), json!({ "success": true }));

        let rewritten = outcome.with_json_body(&json!({ "success": false }));
        assert_eq!(rewritten.set_cookies, vec!["a=1".to_string()]);
        assert_eq!(rewritten.json().unwrap(), json!({ "success": false }));
    }
}
