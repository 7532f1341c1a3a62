//! 日期时间的解析和格式化。
//!
//! 外部接口和共享缓存统一使用`YYYY-MM-DD HH:mm:ss`格式；解析失败时
//! 一律退化为纪元时间，排序时自然排在最后。

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 纪元时间，用作无法解析的时间的占位值。
pub fn epoch() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(0).unwrap()
}

pub fn is_epoch(t: &DateTime<Utc>) -> bool {
    t.timestamp_millis() == 0
}

/// 解析日期时间字符串。解析失败时返回纪元时间。
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    match NaiveDateTime::parse_from_str(s.trim(), DATETIME_FORMAT) {
        Ok(naive) => Utc.from_utc_datetime(&naive),
        Err(_) => epoch(),
    }
}

/// 解析日期时间字符串。解析失败时返回`None`。
pub fn parse_datetime_opt(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), DATETIME_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

pub fn format_datetime(t: &DateTime<Utc>) -> String {
    t.format(DATETIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let t = parse_datetime("2024-01-02 03:04:05");
        assert_eq!(format_datetime(&t), "2024-01-02 03:04:05");
    }

    #[test]
    fn test_unparseable_falls_back_to_epoch() {
        assert!(is_epoch(&parse_datetime("not a date")));
        assert!(is_epoch(&parse_datetime("")));
        assert!(parse_datetime_opt("not a date").is_none());
    }
}
