//! # 通用透传处理器
//!
//! `ANY /api/{*resource}` → 上游 `{resource_prefix}/{resource}`，查询串原样保留。

use axum::{
    Extension,
    extract::{OriginalUri, State},
    http::{HeaderMap, Method},
    response::Response,
};
use bytes::Bytes;

use super::forward_and_respond;
use crate::server::app::AppState;
use crate::server::middleware::RequestId;
use crate::session::{ForwardTarget, MediatedRequest};

/// 客户端侧的挂载前缀
const MOUNT_PREFIX: &str = "/api";

/// 透传任意资源请求
pub async fn forward_resource(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    OriginalUri(uri): OriginalUri,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let target = resource_target(
        &state.config().upstream.paths.resource_prefix,
        uri.path(),
        uri.query(),
    );
    let request = MediatedRequest::new(method, headers, body);
    forward_and_respond(&state, &request_id, &request, &target).await
}

/// 由客户端路径计算上游目标；路径保持原始的百分号编码
fn resource_target(resource_prefix: &str, path: &str, query: Option<&str>) -> ForwardTarget {
    let resource = path.strip_prefix(MOUNT_PREFIX).unwrap_or(path);
    ForwardTarget::resource(format!("{resource_prefix}{resource}")).with_query(query)
}
