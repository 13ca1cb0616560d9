//! 数字文本处理

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

fn grouped_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[+-]?\d{1,3}(,\d{3})+(\.\d+)?$").ok())
        .as_ref()
}

/// 去掉千分位逗号
///
/// 只接受每三位一组的写法（`1,234.5`）；`3,5` 这类逗号不是千分位，返回 `None`。
/// 没有逗号的文本原样返回。
pub fn strip_digit_grouping(text: &str) -> Option<Cow<'_, str>> {
    if !text.contains(',') {
        return Some(Cow::Borrowed(text));
    }
    grouped_pattern()
        .filter(|pattern| pattern.is_match(text))
        .map(|_| Cow::Owned(text.replace(',', "")))
}
