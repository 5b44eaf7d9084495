//! # 上游 HTTP 客户端
//!
//! 对 `reqwest::Client` 的薄封装：统一的根地址、超时与错误映射。
//! 不跟随重定向，3xx 响应连同其 `Set-Cookie` 原样交给调用方。

use std::time::Duration;

use axum::http::{HeaderMap, Method, header};
use reqwest::{Client, RequestBuilder, Response, redirect};

use crate::config::UpstreamConfig;
use crate::error::{ProxyError, Result};

/// 上游身份/会话服务客户端
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl UpstreamClient {
    /// 按配置创建客户端
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| ProxyError::config_with_source("创建上游HTTP客户端失败", e))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
        })
    }

    /// 去掉末尾 `/` 的上游根地址
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 拼接上游地址，`path` 以 `/` 开头
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    /// 构造指向上游 `path` 的请求
    #[must_use]
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// 发送请求；超时归为 `ConnectionTimeout`，其余传输错误归为 `BadGateway`
    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        request.send().await.map_err(|e| self.map_error(e))
    }

    fn map_error(&self, err: reqwest::Error) -> ProxyError {
        let target = err
            .url()
            .map_or_else(|| self.base_url.clone(), |u| u.path().to_string());
        if err.is_timeout() {
            ProxyError::connection_timeout_with_source(
                format!("上游请求超时: {target}"),
                self.timeout.as_secs(),
                err,
            )
        } else {
            ProxyError::bad_gateway_with_source(format!("上游请求失败: {target}"), err)
        }
    }
}

/// 取出响应中全部 `Set-Cookie` 头，每个实例一项
#[must_use]
pub fn collect_set_cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}
