//! CLI output: error mapping and result formatting.

use crate::error::{ApiError, StorageError};
use crate::lease::LeaseStatus;
use crate::store::Row;

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::StorageError(StorageError::Paused) => {
            format!("{} (is the storage lease held elsewhere?)", e)
        }
        _ => e.to_string(),
    }
}

/// One JSON object per line.
pub fn format_rows(rows: &[Row]) -> String {
    rows.iter()
        .map(|row| serde_json::Value::Object(row.clone()).to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_lease_status(name: &str, status: &LeaseStatus) -> String {
    match status {
        LeaseStatus::Free => format!("Lease '{}': free", name),
        LeaseStatus::Held { holder, expires_at } => {
            let mut line = format!("Lease '{}': held", name);
            if let Some(holder) = holder {
                line.push_str(&format!(" by {}", holder));
            }
            if let Some(expires_at) = expires_at {
                line.push_str(&format!(" until {}", expires_at.to_rfc3339()));
            }
            line
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_format_rows() {
        let mut row = Row::new();
        row.insert("key".to_string(), json!("a"));
        row.insert("value".to_string(), json!(1));
        assert_eq!(format_rows(&[row]), r#"{"key":"a","value":1}"#);
        assert_eq!(format_rows(&[]), "");
    }

    #[test]
    fn test_format_lease_status() {
        assert_eq!(format_lease_status("tab", &LeaseStatus::Free), "Lease 'tab': free");
        let held = LeaseStatus::Held {
            holder: Some("42-abc".to_string()),
            expires_at: Utc.timestamp_millis_opt(0).single(),
        };
        assert_eq!(
            format_lease_status("tab", &held),
            "Lease 'tab': held by 42-abc until 1970-01-01T00:00:00+00:00"
        );
    }
}
