use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Uniform body of every API response: `{success, data|error, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_omits_error_field() {
        let value = serde_json::to_value(ApiResponse::ok(vec![1, 2])).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["data"], serde_json::json!([1, 2]));
        assert!(value.get("error").is_none());
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_err_omits_data_field() {
        let value = serde_json::to_value(ApiResponse::<()>::err("Method not allowed")).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "Method not allowed");
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_parse_error_body() {
        let raw = r#"{"success":false,"error":"nope","timestamp":"2024-05-01T10:00:00Z"}"#;
        let parsed: ApiResponse<serde_json::Value> = serde_json::from_str(raw).unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.error.as_deref(), Some("nope"));
        assert!(parsed.data.is_none());
    }
}
