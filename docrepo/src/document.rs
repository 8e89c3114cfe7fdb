//! 文档（Document）
//!
//! 存储中的无模式键值记录。核心层只特殊解释 `id` 键，
//! 时间戳键由实体簿记写入，其余键原样透传。
//!
use crate::error::RepoResult as Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Map;

pub use serde_json::Value;

/// 无模式文档
pub type Document = Map<String, Value>;

/// 文档标识键
pub const ID_KEY: &str = "id";
/// 创建时间键（ISO-8601，毫秒精度，UTC）
pub const CREATED_KEY: &str = "create_datetime";
/// 更新时间键（ISO-8601，毫秒精度，UTC）
pub const UPDATED_KEY: &str = "update_datetime";
/// 存储维护的修改序列键
pub const TS_KEY: &str = "_ts";

/// 读取文档中的非空字符串值
pub fn str_field<'a>(doc: &'a Document, key: &str) -> Option<&'a str> {
    doc.get(key).and_then(Value::as_str)
}

/// 业务字段 -> 文档值
pub fn field_to_value<T: Serialize>(field: &T) -> Result<Value> {
    Ok(serde_json::to_value(field)?)
}

/// 取出文档中的业务字段：缺失或为 null 时返回 None，由调用方保留现值
pub fn take_field<T: DeserializeOwned>(doc: &Document, key: &str) -> Result<Option<T>> {
    match doc.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
    }
}

/// 以统一粒度格式化时间戳
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 解析 ISO-8601 时间戳，格式非法时返回 None
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_uses_millisecond_utc() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        assert_eq!(format_timestamp(at), "2024-03-01T08:30:00.000Z");
        assert_eq!(parse_timestamp("2024-03-01T08:30:00.000Z"), Some(at));
    }

    #[test]
    fn take_field_treats_null_as_absent() {
        let doc: Document = serde_json::from_str(r#"{"a": null, "b": 3}"#).unwrap();
        assert_eq!(take_field::<i64>(&doc, "a").unwrap(), None);
        assert_eq!(take_field::<i64>(&doc, "b").unwrap(), Some(3));
        assert_eq!(take_field::<i64>(&doc, "c").unwrap(), None);
        assert!(take_field::<String>(&doc, "b").is_err());
    }

    #[test]
    fn malformed_timestamp_reads_as_none() {
        assert_eq!(parse_timestamp("yesterday"), None);
    }
}
