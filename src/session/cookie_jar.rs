//! # Cookie Jar
//!
//! 单次请求周期内的 Cookie 状态：由请求的 `Cookie` 头解析而来，
//! 再叠加上游陆续下发的 `Set-Cookie`，最终序列化回 `Cookie` 头。

use indexmap::IndexMap;

/// 有序的 `name -> value` 映射，名字唯一，后写覆盖先写
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    entries: IndexMap<String, String>,
}

impl CookieJar {
    /// 解析 `k1=v1; k2=v2` 形式的 Cookie 头
    ///
    /// 没有 `=` 的片段被丢弃；空串得到空 jar。
    #[must_use]
    pub fn parse(cookie_header: &str) -> Self {
        let mut jar = Self::default();
        for pair in cookie_header.split(';') {
            jar.insert_pair(pair);
        }
        jar
    }

    /// 从可选的 Cookie 头解析
    #[must_use]
    pub fn parse_optional(cookie_header: Option<&str>) -> Self {
        cookie_header.map(Self::parse).unwrap_or_default()
    }

    /// 叠加原始 `Set-Cookie` 字符串
    ///
    /// 只取第一个 `;` 之前的 `name=value`，属性部分忽略；格式错误的条目静默跳过。
    pub fn overlay<I, S>(&mut self, raw_set_cookies: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for raw in raw_set_cookies {
            let raw = raw.as_ref();
            let pair = raw.split(';').next().unwrap_or_default();
            self.insert_pair(pair);
        }
    }

    /// 叠加后返回自身，便于链式调用
    #[must_use]
    pub fn with_overlay<I, S>(mut self, raw_set_cookies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.overlay(raw_set_cookies);
        self
    }

    /// 序列化为 Cookie 头；空 jar 返回 `None`，调用方据此省略该头
    #[must_use]
    pub fn serialize(&self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        Some(
            self.entries
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// 按名称取值
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// 是否存在指定名称的 Cookie
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Cookie 数量
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按插入顺序遍历 `(name, value)`
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn insert_pair(&mut self, pair: &str) {
        let Some((name, value)) = pair.trim().split_once('=') else {
            return;
        };
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        self.entries.insert(name.to_string(), value.trim().to_string());
    }
}

/// 从原始 `Set-Cookie` 中取出指定 Cookie 的值
#[must_use]
pub fn set_cookie_value<'a>(raw_set_cookie: &'a str, name: &str) -> Option<&'a str> {
    let pair = raw_set_cookie.split(';').next()?;
    let (cookie_name, value) = pair.trim().split_once('=')?;
    (cookie_name.trim() == name).then(|| value.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_parse_basic_header() {
        let jar = CookieJar::parse("sessionid=abc; csrftoken=xyz");
        assert_eq!(jar.len(), 2);
        assert_eq!(jar.get("sessionid"), Some("abc"));
        assert_eq!(jar.get("csrftoken"), Some("xyz"));
    }

    #[test]
    fn test_parse_drops_entries_without_equals() {
        let jar = CookieJar::parse("flag; a=1;  ; b=2=3");
        assert_eq!(jar.len(), 2);
        assert!(!jar.contains("flag"));
        // 只按第一个 = 切分
        assert_eq!(jar.get("b"), Some("2=3"));
    }

    #[test]
    fn test_empty_header_yields_empty_jar() {
        let jar = CookieJar::parse("");
        assert!(jar.is_empty());
        assert_eq!(jar.serialize(), None);
        assert!(CookieJar::parse_optional(None).is_empty());
    }

    #[test]
    fn test_overlay_overwrites_and_ignores_attributes() {
        let mut jar = CookieJar::parse("sessionid=old; theme=dark");
        jar.overlay([
            "sessionid=new; Path=/; HttpOnly",
            "csrftoken=tok; Max-Age=31449600; SameSite=Lax",
            "malformed-without-equals; Path=/",
        ]);

        assert_eq!(jar.get("sessionid"), Some("new"));
        assert_eq!(jar.get("csrftoken"), Some("tok"));
        assert_eq!(jar.get("theme"), Some("dark"));
        assert_eq!(jar.len(), 3);
    }

    #[test]
    fn test_overlay_last_duplicate_wins() {
        let jar = CookieJar::default().with_overlay(["a=1; Path=/", "a=2; Path=/"]);
        assert_eq!(jar.get("a"), Some("2"));
    }

    #[test]
    fn test_serialize_preserves_order() {
        let jar = CookieJar::parse("b=2; a=1").with_overlay(["c=3"]);
        assert_eq!(jar.serialize().as_deref(), Some("b=2; a=1; c=3"));
    }

    #[test]
    fn test_set_cookie_value() {
        assert_eq!(
            set_cookie_value("csrftoken=abc; Path=/", "csrftoken"),
            Some("abc")
        );
        assert_eq!(set_cookie_value("sessionid=abc; Path=/", "csrftoken"), None);
        assert_eq!(set_cookie_value("garbage", "csrftoken"), None);
    }

    fn cookie_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,8}"
    }

    fn cookie_value() -> impl Strategy<Value = String> {
        "[A-Za-z0-9]{0,12}"
    }

    proptest! {
        #[test]
        fn prop_overlay_union_with_set_cookie_precedence(
            incoming in proptest::collection::vec((cookie_name(), cookie_value()), 0..6),
            updates in proptest::collection::vec((cookie_name(), cookie_value()), 0..6),
        ) {
            let header = incoming
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            let set_cookies: Vec<String> = updates
                .iter()
                .map(|(k, v)| format!("{k}={v}; Path=/; HttpOnly"))
                .collect();

            let merged = CookieJar::parse(&header).with_overlay(&set_cookies);
            let serialized = merged.serialize().unwrap_or_default();
            let reparsed = CookieJar::parse(&serialized);

            for (name, _) in incoming.iter().chain(updates.iter()) {
                prop_assert!(reparsed.contains(name));
            }
            for (name, _) in &updates {
                let last = updates.iter().rev().find(|(n, _)| n == name).map(|(_, v)| v);
                prop_assert_eq!(reparsed.get(name), last.map(String::as_str));
            }
        }
    }
}
