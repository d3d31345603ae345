//! Shared HTTP utilities for the link-menu bot workspace.
//!
//! Provides the structured error body, header helpers and time formatting
//! used by the bot-server's JSON endpoints.

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::SystemTime;

// ============================================================================
// JSON Response Helpers (framework-agnostic)
// ============================================================================

/// Create a structured error JSON with a default message based on the code.
///
/// Returns: `{"error": {"code": "<code>", "message": "<default message>"}}`
pub fn json_err(code: &str) -> serde_json::Value {
    let message = match code {
        "not_found" => "Resource not found",
        "bad_request" => "Bad request",
        "unauthorized" => "Caller identity required",
        "forbidden" => "Administrator privilege required",
        "unknown_slot" => "Unknown link slot",
        "invalid_url" => "Invalid URL",
        "store_unavailable" => "Storage temporarily unavailable",
        "export_failed" => "Export failed",
        "error" | "internal" => "Internal server error",
        _ => code, // Fallback to code as message for unknown codes
    };
    serde_json::json!({"error": {"code": code, "message": message}})
}

/// Create a structured error JSON with a custom message.
///
/// Returns: `{"error": {"code": "<code>", "message": "<message>"}}`
pub fn json_error_with_message(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({"error": {"code": code, "message": message}})
}

/// HTTP status conventionally paired with an error code.
pub fn status_for_code(code: &str) -> u16 {
    match code {
        "bad_request" | "unknown_slot" | "invalid_url" => 400,
        "unauthorized" => 401,
        "forbidden" => 403,
        "not_found" => 404,
        "store_unavailable" => 503,
        _ => 500,
    }
}

// ============================================================================
// Header Helpers
// ============================================================================

/// `Content-Disposition` value that asks the client to save `filename`.
///
/// Quotes and backslashes are dropped from the name rather than escaped.
pub fn attachment_disposition(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .filter(|c| *c != '"' && *c != '\\' && !c.is_control())
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

// ============================================================================
// Time Utilities
// ============================================================================

/// Convert SystemTime to RFC3339 string (seconds precision, UTC).
pub fn system_time_to_rfc3339(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_json_err() {
        let err = json_err("forbidden");
        assert_eq!(
            err,
            serde_json::json!({"error": {"code": "forbidden", "message": "Administrator privilege required"}})
        );

        // Unknown code falls back to code as message
        let err = json_err("custom_error");
        assert_eq!(err, serde_json::json!({"error": {"code": "custom_error", "message": "custom_error"}}));
    }

    #[test]
    fn test_json_error_with_message() {
        let err = json_error_with_message("bad_request", "Invalid input");
        assert_eq!(
            err,
            serde_json::json!({"error": {"code": "bad_request", "message": "Invalid input"}})
        );
    }

    #[test]
    fn test_status_for_code() {
        assert_eq!(status_for_code("invalid_url"), 400);
        assert_eq!(status_for_code("forbidden"), 403);
        assert_eq!(status_for_code("store_unavailable"), 503);
        assert_eq!(status_for_code("whatever"), 500);
    }

    #[test]
    fn test_attachment_disposition() {
        assert_eq!(
            attachment_disposition("users_export.csv"),
            "attachment; filename=\"users_export.csv\""
        );
        assert_eq!(
            attachment_disposition("a\"b\\c.csv"),
            "attachment; filename=\"abc.csv\""
        );
    }

    #[test]
    fn test_rfc3339() {
        let t = UNIX_EPOCH + Duration::from_secs(86_400);
        assert_eq!(system_time_to_rfc3339(t), "1970-01-02T00:00:00Z");
    }
}
