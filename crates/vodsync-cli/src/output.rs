//! Output formatting for CLI

use chrono::DateTime;
use serde::Serialize;

/// Output format options
pub enum OutputFormat {
    Text,
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }
}

/// Serialize a report for JSON output
pub fn to_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

/// Render an epoch-millisecond timestamp as RFC 3339
pub fn format_ms(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| format!("{timestamp_ms}ms"))
}

/// Render an optional timestamp
pub fn format_opt_ms(timestamp_ms: Option<i64>) -> String {
    match timestamp_ms {
        Some(ts) => format_ms(ts),
        None => "-".to_string(),
    }
}
