//! Inspector errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while running the inspector listener.
#[derive(Debug, Error)]
pub enum InspectorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    #[error("Inspector already stopped")]
    AlreadyStopped,
}

pub type InspectorResult<T> = Result<T, InspectorError>;

/// Error object carried in a protocol response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message} ({code})")]
pub struct ProtocolError {
    pub code: i32,
    pub message: String,
}

impl ProtocolError {
    /// Body is not valid JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// JSON is not a request envelope
    pub const INVALID_REQUEST: i32 = -32600;
    /// Unknown domain or method
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Parameters do not match the method
    pub const INVALID_PARAMS: i32 = -32602;
    /// Valid request the session cannot satisfy in its current state
    pub const SERVER_ERROR: i32 = -32000;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(Self::PARSE_ERROR, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            Self::METHOD_NOT_FOUND,
            format!("'{method}' wasn't found"),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_PARAMS, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(Self::SERVER_ERROR, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_json() {
        let err = ProtocolError::method_not_found("Debugger.frobnicate");
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            serde_json::json!({
                "code": -32601,
                "message": "'Debugger.frobnicate' wasn't found"
            })
        );
    }
}
