//! # 转发请求头构建
//!
//! 由客户端请求推导出发往上游的请求头。纯函数，不修改输入。

use axum::http::{HeaderMap, HeaderName, HeaderValue, header};

use super::cookie_jar::CookieJar;
use super::csrf::TokenShape;
use super::request::MediatedRequest;

/// Django 风格中间件识别的写法
pub const CSRF_HEADER: HeaderName = HeaderName::from_static("x-csrftoken");
/// 其他框架常用的写法
pub const CSRF_HEADER_ALT: HeaderName = HeaderName::from_static("x-csrf-token");

/// 承载无状态令牌的 Cookie 名
pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// 构建选项
#[derive(Debug, Clone, Default)]
pub struct ForwardHeaderOptions<'a> {
    /// 显式给定的 CSRF 令牌，优先于 Cookie 中的值
    pub csrf_token: Option<&'a str>,
    /// 覆盖内容类型
    pub content_type: Option<&'a str>,
    /// 需要叠加到 Cookie 头上的 `Set-Cookie`（例如 CSRF 探测得到的）
    pub extra_set_cookies: &'a [String],
}

/// 转发请求头构建器
#[derive(Debug, Clone)]
pub struct ForwardHeaderBuilder {
    shape: TokenShape,
    csrf_cookie_name: String,
}

impl Default for ForwardHeaderBuilder {
    fn default() -> Self {
        Self::new(TokenShape::default(), "csrftoken")
    }
}

impl ForwardHeaderBuilder {
    /// 以令牌形状与 CSRF Cookie 名创建
    #[must_use]
    pub fn new(shape: TokenShape, csrf_cookie_name: impl Into<String>) -> Self {
        Self {
            shape,
            csrf_cookie_name: csrf_cookie_name.into(),
        }
    }

    /// 构建发往上游的请求头
    #[must_use]
    pub fn build(&self, request: &MediatedRequest, options: &ForwardHeaderOptions<'_>) -> HeaderMap {
        let mut headers = HeaderMap::new();

        let content_type = options
            .content_type
            .or_else(|| request.content_type())
            .unwrap_or(DEFAULT_CONTENT_TYPE);
        if let Ok(value) = HeaderValue::from_str(content_type) {
            headers.insert(header::CONTENT_TYPE, value);
        }

        let jar = CookieJar::parse_optional(request.cookie_header().as_deref())
            .with_overlay(options.extra_set_cookies);
        if let Some(value) = jar.serialize().and_then(|c| HeaderValue::from_str(&c).ok()) {
            headers.insert(header::COOKIE, value);
        }

        let token = options
            .csrf_token
            .or_else(|| jar.get(&self.csrf_cookie_name))
            .and_then(|t| self.shape.accept(t))
            .and_then(|t| HeaderValue::from_str(t).ok());
        if let Some(value) = token {
            headers.insert(CSRF_HEADER, value.clone());
            headers.insert(CSRF_HEADER_ALT, value);
        }

        for name in [header::ORIGIN, header::REFERER] {
            if let Some(value) = request.headers().get(&name) {
                headers.insert(name, value.clone());
            }
        }

        if let Some(value) = request.headers().get(header::AUTHORIZATION) {
            headers.insert(header::AUTHORIZATION, value.clone());
        } else if let Some(value) = bearer_from_cookie(&jar) {
            headers.insert(header::AUTHORIZATION, value);
        }

        headers
    }
}

/// `auth_token` Cookie → `Authorization: Token <value>`
fn bearer_from_cookie(jar: &CookieJar) -> Option<HeaderValue> {
    let raw = jar.get(AUTH_TOKEN_COOKIE).filter(|v| !v.is_empty())?;
    let token = urlencoding::decode(raw).ok()?;
    HeaderValue::from_str(&format!("Token {token}")).ok()
}
