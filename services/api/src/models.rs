//! API Models

use serde::{Deserialize, Serialize};

/// JSON body of every error response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_serialization() {
        let error = ErrorResponse {
            message: "Speech is not configured".to_string(),
        };

        let json = serde_json::to_string(&error).unwrap();
        assert_eq!(json, r#"{"message":"Speech is not configured"}"#);
    }
}
