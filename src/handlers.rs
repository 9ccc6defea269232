// src/handlers.rs
//! Response envelope shared by every JSON endpoint

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let json = serde_json::to_value(ApiResponse::success(3)).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "data": 3}));

        let json = serde_json::to_value(ApiResponse::success_with_message("x", "done".to_string())).unwrap();
        assert_eq!(json["message"], "done");
    }
}
