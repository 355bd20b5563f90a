/// Dispatch Errors and Response Envelope
///
/// Every failure the router can report is a `DispatchError`. At the dispatcher
/// boundary it is flattened into the `{success, data?, error?}` envelope that
/// both transports send back to the caller.

use actix_web::http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Stable error kind names as they appear in the `error.kind` field.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedRequest,
    UnsupportedMethod,
    ToolNotFound,
    InvalidArguments,
    ToolExecutionError,
    DuplicateToolName,
}

/// Errors raised while registering tools or dispatching a request.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Body is not JSON, or the envelope is missing a required part.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// `method` is absent, not a string, or not one of the supported methods.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    /// No tool with this exact name is registered.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Arguments do not satisfy the tool's schema.
    #[error("invalid argument `{field}`: {reason}")]
    InvalidArguments { field: String, reason: String },

    /// The handler reported a failure or panicked.
    #[error("tool `{tool}` failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// A second tool was registered under an existing name.
    #[error("duplicate tool name: {0}")]
    DuplicateToolName(String),
}

impl DispatchError {
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedRequest(_) => ErrorKind::MalformedRequest,
            Self::UnsupportedMethod(_) => ErrorKind::UnsupportedMethod,
            Self::ToolNotFound(_) => ErrorKind::ToolNotFound,
            Self::InvalidArguments { .. } => ErrorKind::InvalidArguments,
            Self::ToolExecution { .. } => ErrorKind::ToolExecutionError,
            Self::DuplicateToolName(_) => ErrorKind::DuplicateToolName,
        }
    }
}

/// Error object carried in a failed envelope.
#[derive(Serialize, Debug, Clone)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

/// Response envelope returned for every dispatched request.
///
/// Exactly one of `data` and `error` is present; the other is omitted from
/// the serialized JSON.
#[derive(Serialize, Debug, Clone)]
pub struct DispatchResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(skip)]
    status: StatusCode,
}

impl DispatchResponse {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            status: StatusCode::OK,
        }
    }

    pub fn failure(err: &DispatchError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                kind: err.kind(),
                message: err.to_string(),
            }),
            status: StatusCode::OK,
        }
    }

    /// Failure for a body that could not be decoded as JSON at all.
    pub fn unparseable(err: &DispatchError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            ..Self::failure(err)
        }
    }

    /// HTTP status for this outcome. Only a body that is not JSON is a client
    /// error; every decoded request answers 200, including shape errors.
    pub fn status_code(&self) -> StatusCode {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_serializes_to_stable_name() {
        let value = serde_json::to_value(ErrorKind::ToolExecutionError).unwrap();
        assert_eq!(value, json!("ToolExecutionError"));
    }

    #[test]
    fn invalid_argument_message_names_field() {
        let err = DispatchError::invalid_argument("text", "missing required field");
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
        assert!(err.to_string().contains("`text`"));
    }

    #[test]
    fn success_envelope_omits_error() {
        let value = serde_json::to_value(DispatchResponse::success(json!({"tools": []}))).unwrap();
        assert_eq!(value, json!({"success": true, "data": {"tools": []}}));
    }

    #[test]
    fn failure_envelope_carries_kind_and_message() {
        let resp = DispatchResponse::failure(&DispatchError::ToolNotFound("missing".into()));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error"]["kind"], json!("ToolNotFound"));
        assert_eq!(value["error"]["message"], json!("tool not found: missing"));
        assert!(value.get("data").is_none());
        assert_eq!(resp.status_code(), StatusCode::OK);
    }

    #[test]
    fn only_unparseable_bodies_are_bad_requests() {
        let err = DispatchError::MalformedRequest("eof".into());
        assert_eq!(DispatchResponse::unparseable(&err).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(DispatchResponse::failure(&err).status_code(), StatusCode::OK);

        let value = serde_json::to_value(DispatchResponse::unparseable(&err)).unwrap();
        assert_eq!(value["error"]["kind"], json!("MalformedRequest"));
        assert!(value.get("status").is_none());
    }
}
