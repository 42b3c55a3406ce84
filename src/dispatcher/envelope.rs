use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Failure classes carried in the envelope's `code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Ok,
    Internal,
    ValidationFailed,
    InvalidParameter,
    MissingParameter,
    NotSupported,
    NotFound,
    InvalidRequest,
}

impl ErrorCode {
    /// Integer written to the envelope.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            ErrorCode::Ok => 0,
            ErrorCode::Internal => 50,
            ErrorCode::ValidationFailed => 51,
            ErrorCode::InvalidParameter => 53,
            ErrorCode::MissingParameter => 54,
            ErrorCode::NotSupported => 59,
            ErrorCode::NotFound => 65,
            ErrorCode::InvalidRequest => 66,
        }
    }

    /// HTTP status sent alongside the envelope.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            ErrorCode::Ok => 200,
            ErrorCode::Internal => 500,
            ErrorCode::NotSupported => 405,
            ErrorCode::NotFound => 404,
            ErrorCode::ValidationFailed
            | ErrorCode::InvalidParameter
            | ErrorCode::MissingParameter
            | ErrorCode::InvalidRequest => 400,
        }
    }

    #[must_use]
    pub const fn is_client_error(self) -> bool {
        let status = self.http_status();
        status >= 400 && status < 500
    }

    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        [
            ErrorCode::Ok,
            ErrorCode::Internal,
            ErrorCode::ValidationFailed,
            ErrorCode::InvalidParameter,
            ErrorCode::MissingParameter,
            ErrorCode::NotSupported,
            ErrorCode::NotFound,
            ErrorCode::InvalidRequest,
        ]
        .into_iter()
        .find(|c| c.code() == code)
    }
}

/// The `{code, message, data}` body of every response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub code: i32,
    pub message: String,
    pub data: Value,
}

impl Envelope {
    #[must_use]
    pub fn success(data: Value) -> Self {
        Self {
            code: ErrorCode::Ok.code(),
            message: "Success".to_string(),
            data,
        }
    }

    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: Value::Null,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == ErrorCode::Ok.code()
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        serde_json::json!({
            "code": self.code,
            "message": self.message,
            "data": self.data,
        })
    }
}
