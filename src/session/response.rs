//! # 透传响应构建

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use bytes::Bytes;

const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// 用上游的状态码与原始响应体构建客户端响应
///
/// 每个 `Set-Cookie` 作为独立的头实例追加，绝不拼接成一个值。
#[must_use]
pub fn build_passthrough(
    status: StatusCode,
    content_type: Option<&str>,
    body: Bytes,
    set_cookies: &[String],
) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    let content_type = content_type
        .and_then(|v| HeaderValue::from_str(v).ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    headers.insert(header::CONTENT_TYPE, content_type);

    for cookie in set_cookies {
        if let Ok(value) = HeaderValue::from_str(cookie) {
            headers.append(header::SET_COOKIE, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_preserves_status_body_and_content_type() {
        let response = build_passthrough(
            StatusCode::CREATED,
            Some("text/csv"),
            Bytes::from_static(b"a,b\n1,2"),
            &[],
        );

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"a,b\n1,2");
    }

    #[test]
    fn test_content_type_defaults_to_json() {
        let response = build_passthrough(StatusCode::OK, None, Bytes::new(), &[]);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }

    proptest! {
        #[test]
        fn prop_one_header_instance_per_cookie(
            cookies in proptest::collection::vec("[a-z]{1,8}=[A-Za-z0-9]{0,16}(; Path=/)?(; HttpOnly)?", 0..8)
        ) {
            let response = build_passthrough(StatusCode::OK, None, Bytes::new(), &cookies);
            let emitted: Vec<&str> = response
                .headers()
                .get_all(header::SET_COOKIE)
                .iter()
                .map(|v| v.to_str().unwrap())
                .collect();
            prop_assert_eq!(emitted.len(), cookies.len());
            for (emitted, expected) in emitted.iter().zip(&cookies) {
                prop_assert_eq!(*emitted, expected.as_str());
            }
        }
    }
}
