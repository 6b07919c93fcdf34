//! Serialization utilities for the REST wire format and persisted settings
//!
//! The REST API encodes most numbers and booleans as JSON strings
//! (`"totalAvailable": "101"`, `"showTabs": "true"`), so the wire types use the
//! flexible deserializers below instead of trusting the JSON value type.

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Deserialize u64 values that might be strings or numbers
pub fn deserialize_u64_flexible<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum U64OrString {
        Number(u64),
        String(String),
    }

    match U64OrString::deserialize(deserializer)? {
        U64OrString::Number(n) => Ok(n),
        U64OrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Optional variant of [`deserialize_u64_flexible`]; use with `#[serde(default)]`
pub fn deserialize_option_u64_flexible<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flexible {
        Number(u64),
        String(String),
        Null,
    }

    match Option::<Flexible>::deserialize(deserializer)? {
        None | Some(Flexible::Null) => Ok(None),
        Some(Flexible::Number(n)) => Ok(Some(n)),
        Some(Flexible::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Flexible::String(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Deserialize booleans that might arrive as `true` or `"true"`; use with `#[serde(default)]`
pub fn deserialize_bool_flexible<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        String(String),
    }

    match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(b) => Ok(b),
        BoolOrString::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "invalid boolean value '{}'",
                other
            ))),
        },
    }
}

/// Durations persisted as whole milliseconds
pub mod duration_millis {
    use super::*;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize_u64_flexible(deserializer).map(Duration::from_millis)
    }
}

/// Ordered duration lists persisted as whole milliseconds
pub mod duration_millis_vec {
    use super::*;
    use serde::ser::SerializeSeq;

    pub fn serialize<S>(values: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&(value.as_millis() as u64))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Vec::<u64>::deserialize(deserializer)?;
        Ok(millis.into_iter().map(Duration::from_millis).collect())
    }
}

/// Format bytes with human-readable units
pub fn format_bytes_human(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: u64 = 1024;

    if bytes < THRESHOLD {
        return format!("{} B", bytes);
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD as f64 && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD as f64;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Deserialize)]
    struct Pagination {
        #[serde(deserialize_with = "deserialize_u64_flexible")]
        total: u64,
        #[serde(default, deserialize_with = "deserialize_option_u64_flexible")]
        size: Option<u64>,
        #[serde(default, deserialize_with = "deserialize_bool_flexible")]
        flag: bool,
    }

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Intervals {
        #[serde(with = "duration_millis_vec")]
        intervals: Vec<Duration>,
        #[serde(with = "duration_millis")]
        timeout: Duration,
    }

    #[test]
    fn test_flexible_numbers_accept_strings_and_numbers() {
        let parsed: Pagination =
            serde_json::from_str(r#"{"total": "101", "size": 50, "flag": "true"}"#).unwrap();
        assert_eq!(parsed.total, 101);
        assert_eq!(parsed.size, Some(50));
        assert!(parsed.flag);

        let parsed: Pagination = serde_json::from_str(r#"{"total": 7, "size": ""}"#).unwrap();
        assert_eq!(parsed.total, 7);
        assert_eq!(parsed.size, None);
        assert!(!parsed.flag);

        assert!(serde_json::from_str::<Pagination>(r#"{"total": "seven"}"#).is_err());
    }

    #[test]
    fn test_duration_lists_are_stored_as_millis() {
        let json = r#"{"intervals": [100, 2000], "timeout": "1500"}"#;
        let parsed: Intervals = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed.intervals,
            vec![Duration::from_millis(100), Duration::from_secs(2)]
        );
        assert_eq!(parsed.timeout, Duration::from_millis(1500));

        let written = serde_json::to_value(&parsed).unwrap();
        assert_eq!(written["intervals"], serde_json::json!([100, 2000]));
        assert_eq!(written["timeout"], serde_json::json!(1500));
    }

    #[test]
    fn test_format_bytes_human() {
        assert_eq!(format_bytes_human(512), "512 B");
        assert_eq!(format_bytes_human(1536), "1.50 KB");
        assert_eq!(format_bytes_human(64 * 1024 * 1024), "64.00 MB");
    }
}
