//! # 会话桥接
//!
//! 无状态令牌客户端与 Cookie + CSRF 上游会话服务之间的转发核心。

pub mod cookie_jar;
pub mod csrf;
pub mod forwarder;
pub mod headers;
pub mod request;
pub mod response;
pub mod rotator;
pub mod upstream;

pub use cookie_jar::CookieJar;
pub use csrf::{CsrfAcquisition, CsrfBroker, TokenShape};
pub use forwarder::{ForwardOutcome, Forwarder};
pub use headers::{ForwardHeaderBuilder, ForwardHeaderOptions};
pub use request::{BodyKind, ForwardTarget, HttpMethodKind, MediatedRequest, TargetKind};
pub use response::build_passthrough;
pub use rotator::AuthCookieRotator;
pub use upstream::UpstreamClient;
