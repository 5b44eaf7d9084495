use thiserror::Error;

/// 上游响应体解析失败
///
/// 上游返回的非 JSON 或损坏的响应体属于可恢复错误：调用方自行决定
/// 是向上传播还是按“数据缺失”处理（例如跳过认证 Cookie 轮换）。
#[derive(Debug, Error)]
pub enum BodyParseError {
    #[error("response body is empty")]
    Empty,

    #[error("response body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
