//! # 旧身份库密码哈希
//!
//! 格式为 `pbkdf2_sha256$<iterations>$<salt>$<base64(digest)>`，与身份库中
//! 已有数据逐字节兼容。校验失败一律返回 `false`，不抛错。

use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::distributions::{Alphanumeric, DistString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

/// 唯一支持的算法标识
pub const ALGORITHM: &str = "pbkdf2_sha256";

/// 新哈希的默认迭代次数
pub const DEFAULT_ITERATIONS: u32 = 260_000;

const SALT_LENGTH: usize = 12;
const DIGEST_LENGTH: usize = 32;

/// 计算密码哈希
#[must_use]
pub fn hash_password(password: &str, iterations: u32) -> String {
    let salt = Alphanumeric.sample_string(&mut rand::thread_rng(), SALT_LENGTH);
    encode(password, &salt, iterations)
}

/// 用指定盐值计算哈希，`hash_password` 与校验共用
#[must_use]
pub fn encode(password: &str, salt: &str, iterations: u32) -> String {
    let digest = derive(password, salt, iterations);
    format!("{ALGORITHM}${iterations}${salt}${}", STANDARD.encode(digest))
}

/// 校验密码
///
/// 字段数不是 4、算法不符、迭代次数非法、盐或摘要为空时返回 `false` 并记录告警。
#[must_use]
pub fn verify_password(password: &str, encoded: &str) -> bool {
    let Some(parsed) = ParsedHash::parse(encoded) else {
        warn!(component = "password", "存储的密码哈希格式无效，校验失败");
        return false;
    };
    let Ok(expected) = STANDARD.decode(parsed.digest) else {
        warn!(component = "password", "存储的密码摘要不是合法的 base64，校验失败");
        return false;
    };

    let actual = derive(password, parsed.salt, parsed.iterations);
    actual.as_slice().ct_eq(expected.as_slice()).into()
}

/// 存储的哈希迭代次数低于目标值（或无法解析）时需要重新哈希
#[must_use]
pub fn needs_rehash(encoded: &str, iterations: u32) -> bool {
    ParsedHash::parse(encoded).is_none_or(|parsed| parsed.iterations < iterations)
}

fn derive(password: &str, salt: &str, iterations: u32) -> [u8; DIGEST_LENGTH] {
    let mut digest = [0u8; DIGEST_LENGTH];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), iterations, &mut digest);
    digest
}

struct ParsedHash<'a> {
    iterations: u32,
    salt: &'a str,
    digest: &'a str,
}

impl<'a> ParsedHash<'a> {
    fn parse(encoded: &'a str) -> Option<Self> {
        let fields: Vec<&str> = encoded.split('$').collect();
        let &[algorithm, iterations, salt, digest] = fields.as_slice() else {
            return None;
        };
        if algorithm != ALGORITHM || salt.is_empty() || digest.is_empty() {
            return None;
        }
        let iterations: u32 = iterations.parse().ok().filter(|n| *n > 0)?;
        Some(Self {
            iterations,
            salt,
            digest,
        })
    }
}
