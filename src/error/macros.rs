//! # 错误处理宏

/// 按变体名快速构造 `ProxyError`
///
/// ```ignore
/// crate::error!(Config, "missing upstream url");
/// crate::error!(Network, format!("probe failed: {e}"), e);
/// ```
#[macro_export]
macro_rules! error {
    ($variant:ident, $msg:expr) => {
        $crate::error::ProxyError::$variant {
            message: $msg.into(),
            source: None,
        }
    };
    ($variant:ident, $msg:expr, $source:expr) => {
        $crate::error::ProxyError::$variant {
            message: $msg.into(),
            source: Some(::anyhow::Error::from($source)),
        }
    };
}

/// 快速创建配置错误的宏
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::ProxyError::config($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::ProxyError::config(format!($fmt, $($arg)*))
    };
}

/// 确保条件成立，否则返回配置错误
#[macro_export]
macro_rules! ensure_config {
    ($cond:expr, $msg:expr) => {
        if !($cond) {
            return Err($crate::config_error!($msg));
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            return Err($crate::config_error!($fmt, $($arg)*));
        }
    };
}
