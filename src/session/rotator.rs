//! # 认证 Cookie 轮换
//!
//! 上游签发的无状态令牌在这里变成 `HttpOnly` 的 `auth_token` Cookie，
//! 之后的请求只需携带 Cookie。

use serde::Deserialize;

use super::headers::AUTH_TOKEN_COOKIE;
use crate::config::AppConfig;
use crate::error::BodyParseError;

/// 认证响应中关心的字段
#[derive(Debug, Deserialize)]
struct IssuedToken {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    token: Option<String>,
}

/// 认证 Cookie 轮换器
#[derive(Debug, Clone, Default)]
pub struct AuthCookieRotator {
    secure: bool,
    max_age_secs: Option<u64>,
}

impl AuthCookieRotator {
    /// `secure` 决定是否附加 `Secure`
    #[must_use]
    pub const fn new(secure: bool, max_age_secs: Option<u64>) -> Self {
        Self {
            secure,
            max_age_secs,
        }
    }

    /// 按应用配置创建
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.secure_cookies(), config.cookie.max_age_secs)
    }

    /// 从成功的认证响应体中提取令牌并生成 `Set-Cookie`（0 或 1 个）
    ///
    /// 响应体无法解析时按“没有令牌”处理。
    #[must_use]
    pub fn extract(&self, body: &[u8], upstream_succeeded: bool) -> Vec<String> {
        if !upstream_succeeded {
            return Vec::new();
        }
        match parse_issued_token(body) {
            Ok(Some(token)) => vec![self.mint(&token)],
            Ok(None) | Err(_) => Vec::new(),
        }
    }

    /// 生成认证 Cookie
    #[must_use]
    pub fn mint(&self, token: &str) -> String {
        let mut cookie = format!(
            "{AUTH_TOKEN_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax",
            urlencoding::encode(token)
        );
        if let Some(max_age) = self.max_age_secs {
            cookie.push_str(&format!("; Max-Age={max_age}"));
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// 注销时清除认证 Cookie
    #[must_use]
    pub fn expire(&self) -> String {
        let mut cookie = format!("{AUTH_TOKEN_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

fn parse_issued_token(body: &[u8]) -> Result<Option<String>, BodyParseError> {
    if body.is_empty() {
        return Err(BodyParseError::Empty);
    }
    let issued: IssuedToken = serde_json::from_slice(body)?;
    Ok(issued
        .success
        .then_some(issued.token)
        .flatten()
        .filter(|t| !t.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mints_cookie_on_success() {
        let cookies = AuthCookieRotator::default()
            .extract(br#"{"success":true,"token":"abc123"}"#, true);
        assert_eq!(
            cookies,
            vec!["auth_token=abc123; Path=/; HttpOnly; SameSite=Lax".to_string()]
        );
    }

    #[test]
    fn test_token_is_url_encoded() {
        let cookies = AuthCookieRotator::default()
            .extract(br#"{"success":true,"token":"a b;c=d"}"#, true);
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].starts_with("auth_token=a%20b%3Bc%3Dd;"));
    }

    #[test]
    fn test_no_cookie_without_success_or_token() {
        let rotator = AuthCookieRotator::default();
        assert!(rotator.extract(br#"{"success":true,"token":"abc"}"#, false).is_empty());
        assert!(rotator.extract(br#"{"success":false,"token":"abc"}"#, true).is_empty());
        assert!(rotator.extract(br#"{"token":"abc"}"#, true).is_empty());
        assert!(rotator.extract(br#"{"success":true}"#, true).is_empty());
        assert!(rotator.extract(br#"{"success":true,"token":""}"#, true).is_empty());
    }

    #[test]
    fn test_malformed_body_is_not_fatal() {
        let rotator = AuthCookieRotator::default();
        assert!(rotator.extract(b"<html>oops</html>", true).is_empty());
        assert!(rotator.extract(b"", true).is_empty());
        assert!(rotator.extract(br#"{"success":"yes","token":1}"#, true).is_empty());
    }

    #[test]
    fn test_secure_and_max_age_from_config() {
        let mut config = AppConfig {
            environment: Environment::Production,
            ..AppConfig::default()
        };
        config.cookie.max_age_secs = Some(3600);
        let rotator = AuthCookieRotator::from_config(&config);

        assert_eq!(
            rotator.mint("t"),
            "auth_token=t; Path=/; HttpOnly; SameSite=Lax; Max-Age=3600; Secure"
        );
        assert_eq!(
            rotator.expire(),
            "auth_token=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Secure"
        );
    }

    #[test]
    fn test_parse_errors_are_typed() {
        assert!(matches!(parse_issued_token(b""), Err(BodyParseError::Empty)));
        assert!(matches!(parse_issued_token(b"{"), Err(BodyParseError::Json(_))));
    }
}
