//! # CSRF 令牌代理
//!
//! 依次探测上游的候选 CSRF 端点，从响应体、响应头或 `Set-Cookie` 中提取令牌。
//! 探测是顺序的，命中第一个合法令牌后不再请求后续候选。

use axum::http::{HeaderMap, Method, header};
use serde_json::Value;

use super::cookie_jar::{CookieJar, set_cookie_value};
use super::upstream::{UpstreamClient, collect_set_cookies};
use crate::config::CsrfConfig;
use crate::logging::{LogComponent, LogStage, mask_token};
use crate::{ldebug, linfo, lwarn};

/// 令牌形状校验：限定长度的纯 ASCII 字母数字串
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenShape {
    lengths: Vec<usize>,
}

impl Default for TokenShape {
    fn default() -> Self {
        Self {
            lengths: vec![32, 64],
        }
    }
}

impl TokenShape {
    /// 以允许的长度集合创建
    #[must_use]
    pub fn new(lengths: impl Into<Vec<usize>>) -> Self {
        Self {
            lengths: lengths.into(),
        }
    }

    /// 长度在允许集合内且只含 ASCII 字母数字
    #[must_use]
    pub fn is_valid(&self, candidate: &str) -> bool {
        self.lengths.contains(&candidate.len())
            && candidate.bytes().all(|b| b.is_ascii_alphanumeric())
    }

    /// 合法时原样返回，否则视为缺失
    #[must_use]
    pub fn accept<'a>(&self, candidate: &'a str) -> Option<&'a str> {
        self.is_valid(candidate).then_some(candidate)
    }
}

/// 一次令牌获取的结果
///
/// `new_set_cookies` 即使没拿到令牌也必须转发给客户端，
/// 上游可能已经在探测过程中建立了会话。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsrfAcquisition {
    /// 形状合法的令牌
    pub token: Option<String>,
    /// 探测过程中收到的全部 `Set-Cookie`
    pub new_set_cookies: Vec<String>,
}

/// CSRF 令牌代理
#[derive(Debug, Clone)]
pub struct CsrfBroker {
    upstream: UpstreamClient,
    config: CsrfConfig,
    shape: TokenShape,
}

impl CsrfBroker {
    /// 以上游客户端与探测配置创建
    #[must_use]
    pub fn new(upstream: UpstreamClient, config: CsrfConfig) -> Self {
        let shape = TokenShape::new(config.token_lengths.clone());
        Self {
            upstream,
            config,
            shape,
        }
    }

    /// 令牌形状规则
    #[must_use]
    pub const fn shape(&self) -> &TokenShape {
        &self.shape
    }

    /// 获取 CSRF 令牌
    ///
    /// 单个候选的网络错误只记日志并跳过；全部失败时退回调用方自带的
    /// `csrftoken` Cookie，仍然拿不到则返回 `token: None`。
    pub async fn acquire(
        &self,
        request_id: &str,
        request_cookie_header: Option<&str>,
    ) -> CsrfAcquisition {
        let mut acquisition = CsrfAcquisition::default();

        for path in &self.config.candidate_paths {
            let mut request = self.upstream.request(Method::GET, path);
            if let Some(cookie) = request_cookie_header {
                request = request.header(header::COOKIE, cookie);
            }

            let response = match self.upstream.send(request).await {
                Ok(response) => response,
                Err(e) => {
                    lwarn!(
                        request_id,
                        LogStage::Csrf,
                        LogComponent::CsrfBroker,
                        "probe_failed",
                        "CSRF候选端点不可达，尝试下一个",
                        path = %path,
                        error = %e
                    );
                    continue;
                }
            };

            let status = response.status();
            let headers = response.headers().clone();
            let set_cookies = collect_set_cookies(&headers);
            acquisition.new_set_cookies.extend(set_cookies.iter().cloned());

            if !status.is_success() {
                ldebug!(
                    request_id,
                    LogStage::Csrf,
                    LogComponent::CsrfBroker,
                    "probe_skipped",
                    "CSRF候选端点返回非成功状态",
                    path = %path,
                    status = status.as_u16()
                );
                continue;
            }

            let body = response.bytes().await.unwrap_or_default();
            if let Some(token) = self.extract(&body, &headers, &set_cookies) {
                linfo!(
                    request_id,
                    LogStage::Csrf,
                    LogComponent::CsrfBroker,
                    "token_acquired",
                    "已获取CSRF令牌",
                    path = %path,
                    token = %mask_token(&token)
                );
                acquisition.token = Some(token);
                return acquisition;
            }
        }

        let jar = CookieJar::parse_optional(request_cookie_header);
        acquisition.token = jar
            .get(&self.config.cookie_name)
            .and_then(|v| self.shape.accept(v))
            .map(str::to_string);

        if acquisition.token.is_some() {
            ldebug!(
                request_id,
                LogStage::Csrf,
                LogComponent::CsrfBroker,
                "cookie_fallback",
                "使用调用方Cookie中的CSRF令牌"
            );
        } else {
            lwarn!(
                request_id,
                LogStage::Csrf,
                LogComponent::CsrfBroker,
                "token_unavailable",
                "未能获取CSRF令牌，继续转发",
                collected_cookies = acquisition.new_set_cookies.len()
            );
        }
        acquisition
    }

    /// 响应体字段 → 响应头 → `Set-Cookie`，取第一个形状合法的值
    fn extract(&self, body: &[u8], headers: &HeaderMap, set_cookies: &[String]) -> Option<String> {
        self.from_body(body)
            .or_else(|| self.from_headers(headers))
            .or_else(|| self.from_set_cookies(set_cookies))
    }

    fn from_body(&self, body: &[u8]) -> Option<String> {
        let value: Value = serde_json::from_slice(body).ok()?;
        self.config
            .body_fields
            .iter()
            .filter_map(|field| value.get(field).and_then(Value::as_str))
            .find_map(|candidate| self.shape.accept(candidate))
            .map(str::to_string)
    }

    fn from_headers(&self, headers: &HeaderMap) -> Option<String> {
        self.config
            .response_headers
            .iter()
            .filter_map(|name| headers.get(name.as_str()).and_then(|v| v.to_str().ok()))
            .find_map(|candidate| self.shape.accept(candidate.trim()))
            .map(str::to_string)
    }

    fn from_set_cookies(&self, set_cookies: &[String]) -> Option<String> {
        set_cookies
            .iter()
            .filter_map(|raw| set_cookie_value(raw, &self.config.cookie_name))
            .find_map(|candidate| self.shape.accept(candidate))
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;
    use axum::http::HeaderValue;
    use rstest::rstest;

    const TOKEN_32: &str = "abcdefghijABCDEFGHIJ0123456789xy";

    fn broker() -> CsrfBroker {
        let upstream = UpstreamClient::new(&UpstreamConfig::default()).unwrap();
        CsrfBroker::new(upstream, CsrfConfig::default())
    }

    #[rstest]
    #[case(TOKEN_32, true)]
    #[case(&"a1".repeat(32), true)]
    #[case("", false)]
    #[case("short", false)]
    #[case(&"a".repeat(33), false)]
    #[case("abcdefghijABCDEFGHIJ0123456789x-", false)]
    #[case("abcdefghijABCDEFGHIJ01234567 9xy", false)]
    #[case(&"é".repeat(16), false)]
    fn test_default_token_shape(#[case] candidate: &str, #[case] expected: bool) {
        assert_eq!(TokenShape::default().is_valid(candidate), expected);
    }

    #[test]
    fn test_configured_token_lengths() {
        let shape = TokenShape::new(vec![8]);
        assert!(shape.is_valid("abcd1234"));
        assert!(!shape.is_valid(TOKEN_32));
    }

    #[test]
    fn test_extract_prefers_body_then_header_then_cookie() {
        let broker = broker();
        let other = "Z".repeat(32);
        let mut headers = HeaderMap::new();
        headers.insert("x-csrftoken", HeaderValue::from_str(&other).unwrap());
        let cookies = vec![format!("csrftoken={}; Path=/", "Y".repeat(32))];

        let body = format!(r#"{{"csrfToken":"{TOKEN_32}"}}"#);
        assert_eq!(
            broker.extract(body.as_bytes(), &headers, &cookies).as_deref(),
            Some(TOKEN_32)
        );
        assert_eq!(
            broker.extract(b"not json", &headers, &cookies),
            Some(other)
        );
        assert_eq!(
            broker.extract(b"{}", &HeaderMap::new(), &cookies),
            Some("Y".repeat(32))
        );
    }

    #[test]
    fn test_extract_skips_malformed_candidates() {
        let broker = broker();
        let mut headers = HeaderMap::new();
        headers.insert("x-csrf-token", HeaderValue::from_static("bad-token!"));
        let body = format!(r#"{{"csrfToken":"nope","csrf_token":"{TOKEN_32}"}}"#);

        assert_eq!(
            broker.extract(body.as_bytes(), &headers, &[]).as_deref(),
            Some(TOKEN_32)
        );
        assert_eq!(broker.extract(b"{}", &headers, &[]), None);
    }
}
