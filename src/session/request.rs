//! # 转发请求上下文
//!
//! 一次转发周期的只读输入：方法、请求头、请求体，以及上游目标。

use axum::http::{HeaderMap, Method, header};
use bytes::Bytes;

/// 方法是否会修改上游状态（决定是否需要 CSRF 令牌）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethodKind {
    /// GET / HEAD / OPTIONS 等
    Safe,
    /// POST / PUT / PATCH / DELETE
    Mutating,
}

impl HttpMethodKind {
    /// 按 HTTP 方法分类
    #[must_use]
    pub fn of(method: &Method) -> Self {
        if matches!(
            *method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        ) {
            Self::Mutating
        } else {
            Self::Safe
        }
    }

    /// 是否需要 CSRF 令牌
    #[must_use]
    pub const fn is_mutating(self) -> bool {
        matches!(self, Self::Mutating)
    }
}

/// 请求体协商结果所依据的内容类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Multipart,
    Text,
}

impl BodyKind {
    /// 按 `Content-Type` 判断请求体类型
    #[must_use]
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type else {
            return Self::Text;
        };
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if essence == "application/json" || essence.ends_with("+json") {
            Self::Json
        } else if essence == "multipart/form-data" {
            Self::Multipart
        } else {
            Self::Text
        }
    }
}

/// 上游目标的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// 会改变身份/会话状态的端点（登录、注册），POST 成功后轮换认证 Cookie
    Session,
    /// 普通资源
    Resource,
}

/// 上游目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardTarget {
    /// 以 `/` 开头的上游路径，可带查询串
    pub path: String,
    /// 目标类别
    pub kind: TargetKind,
}

impl ForwardTarget {
    /// 会话类目标（可能签发认证 Cookie）
    pub fn session(path: impl Into<String>) -> Self {
        Self {
            path: normalize_path(path.into()),
            kind: TargetKind::Session,
        }
    }

    /// 普通资源目标
    pub fn resource(path: impl Into<String>) -> Self {
        Self {
            path: normalize_path(path.into()),
            kind: TargetKind::Resource,
        }
    }

    /// 附加查询串（`None` 或空串时不变）
    #[must_use]
    pub fn with_query(mut self, query: Option<&str>) -> Self {
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            self.path = format!("{}?{query}", self.path);
        }
        self
    }
}

fn normalize_path(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

/// 客户端请求的不可变快照
#[derive(Debug, Clone)]
pub struct MediatedRequest {
    method: Method,
    headers: HeaderMap,
    body: Bytes,
}

impl MediatedRequest {
    /// 由入站请求的各部分构造
    #[must_use]
    pub const fn new(method: Method, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            headers,
            body,
        }
    }

    /// 请求方法
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// 方法类别
    #[must_use]
    pub fn method_kind(&self) -> HttpMethodKind {
        HttpMethodKind::of(&self.method)
    }

    /// 入站请求头
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// 原始请求体
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// 文本形式的请求头；非 ASCII 值视为缺失
    #[must_use]
    pub fn header_str(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// 原始 Cookie 头
    ///
    /// HTTP/2 允许拆成多个 `cookie` 头，这里按 `; ` 合并。
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }

    /// 入站 `Content-Type`
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header_str(header::CONTENT_TYPE)
    }
}
