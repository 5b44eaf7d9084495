//! # 代理服务器
//!
//! Axum HTTP 服务器：挂载认证路由与通用透传路由。

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::Response;
use axum::routing::get;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::middleware::{REQUEST_ID_HEADER, request_id_middleware};
use crate::auth::IdentityStore;
use crate::config::AppConfig;
use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::session::Forwarder;
use crate::{lerror, linfo, lwarn};

/// 处理器 panic 时的兜底提示
const PANIC_MESSAGE: &str = "Internal Server Error";

/// 路由处理器共享的只读状态
#[derive(Debug, Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    forwarder: Forwarder,
    identity: Option<IdentityStore>,
}

impl AppState {
    /// 按配置创建状态；`identity` 仅在身份库直连启用时传入
    pub fn new(config: Arc<AppConfig>, identity: Option<IdentityStore>) -> Result<Self> {
        let forwarder = Forwarder::new(&config)?;
        Ok(Self {
            config,
            forwarder,
            identity,
        })
    }

    /// 全局配置
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 共享的转发器
    #[must_use]
    pub const fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    /// 身份库（未启用直连时为 `None`）
    #[must_use]
    pub const fn identity(&self) -> Option<&IdentityStore> {
        self.identity.as_ref()
    }
}

/// 代理服务器
pub struct BridgeServer {
    addr: SocketAddr,
    router: Router,
}

impl BridgeServer {
    /// 创建服务器
    pub fn new(state: AppState) -> Result<Self> {
        let server = &state.config().server;
        let ip = server.host.parse::<std::net::IpAddr>().map_err(|e| {
            crate::error!(Config, format!("无效的监听地址 '{}'", server.host), e)
        })?;
        let addr = SocketAddr::new(ip, server.port);

        Ok(Self {
            addr,
            router: create_app(state),
        })
    }

    /// 监听地址
    #[must_use]
    pub const fn bind_address(&self) -> SocketAddr {
        self.addr
    }

    /// 启动服务器，收到 Ctrl+C 后优雅退出
    pub async fn serve(self) -> Result<()> {
        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::ServerSetup,
            "server_start",
            &format!("代理服务监听于 {}", self.addr)
        );

        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| crate::error!(Network, "代理服务异常退出", e))?;

        linfo!(
            "system",
            LogStage::Shutdown,
            LogComponent::ServerSetup,
            "server_stopped",
            "代理服务已停止"
        );
        Ok(())
    }
}

/// 组装完整的应用路由（测试中直接使用）
pub fn create_app(state: AppState) -> Router {
    let server_config = state.config().server.clone();

    let mut app = Router::new()
        .nest("/api", super::routes::create_routes(state))
        .route("/ping", get(handlers::system::ping_handler))
        .layer(DefaultBodyLimit::max(server_config.max_body_bytes))
        .layer(catch_panic_layer());

    app = app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    if server_config.enable_cors {
        if let Some(cors) = cors_layer(&server_config.cors_origins) {
            app = app.layer(cors);
        }
    }

    app.layer(axum::middleware::from_fn(request_id_middleware))
}

/// 携带 Cookie 的跨域请求必须列出明确的源
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter(|origin| origin.as_str() != "*")
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                lwarn!(
                    "system",
                    LogStage::Startup,
                    LogComponent::ServerSetup,
                    "cors_origin_invalid",
                    &format!("忽略无效的CORS源 '{origin}': {e}")
                );
                None
            }
        })
        .collect();

    if origins.is_empty() {
        lwarn!(
            "system",
            LogStage::Startup,
            LogComponent::ServerSetup,
            "cors_disabled",
            "已启用CORS但没有可用的源地址，跳过CORS配置"
        );
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_credentials(true)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                header::ACCEPT,
                header::ORIGIN,
            ])
            .expose_headers([REQUEST_ID_HEADER]),
    )
}

type PanicHandler = fn(Box<dyn Any + Send + 'static>) -> Response;

/// 处理器 panic 时返回 500 信封而不是断开连接
fn catch_panic_layer() -> CatchPanicLayer<PanicHandler> {
    CatchPanicLayer::custom(panic_response as PanicHandler)
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    lerror!(
        "system",
        LogStage::Internal,
        LogComponent::ServerSetup,
        "handler_panic",
        "请求处理器发生 panic",
        panic = detail
    );
    handlers::failure_response(StatusCode::INTERNAL_SERVER_ERROR, PANIC_MESSAGE)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        lwarn!(
            "system",
            LogStage::Shutdown,
            LogComponent::ServerSetup,
            "signal_error",
            &format!("监听关闭信号失败: {e}")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    async fn exploding_handler() -> &'static str {
        panic!("handler exploded")
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_internal_error() {
        let app = Router::new()
            .route("/boom", get(exploding_handler))
            .layer(catch_panic_layer());

        let response = app
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value =
            serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap())
                .unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "success": false, "message": "Internal Server Error" })
        );
    }

    #[test]
    fn test_cors_requires_explicit_origins() {
        assert!(cors_layer(&[]).is_none());
        assert!(cors_layer(&["*".to_string()]).is_none());
        assert!(cors_layer(&["https://app.example.com".to_string()]).is_some());
    }

    #[test]
    fn test_invalid_host_rejected() {
        let mut config = AppConfig::default();
        config.server.host = "not-an-ip".to_string();
        let state = AppState::new(Arc::new(config), None).unwrap();
        assert!(BridgeServer::new(state).is_err());
    }
}
