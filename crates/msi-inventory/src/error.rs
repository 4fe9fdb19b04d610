//! Error types for the inventory core.
//!
//! Only terminal failures appear here. End-of-sequence, absent values and
//! metadata cache misses are ordinary control flow and are absorbed before
//! they can reach a caller.

use thiserror::Error;

use crate::property::ValueKind;
use crate::status::StatusCode;

/// Main error type for the inventory core.
#[derive(Debug, Error)]
pub enum InventoryError {
    // Caller errors
    #[error("Invalid argument for {field}: {message}")]
    InvalidArgument { field: String, message: String },

    // Native contract errors
    #[error("Native protocol violation during {operation}: {message}")]
    ProtocolViolation { operation: String, message: String },

    #[error("Native operation {operation} failed with status {code}")]
    NativeOperationFailed { operation: String, code: StatusCode },

    // Decoding errors
    #[error("Cannot convert property {property} value {raw:?} to {kind}")]
    Conversion {
        property: String,
        kind: ValueKind,
        raw: String,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;

impl From<serde_json::Error> for InventoryError {
    fn from(err: serde_json::Error) -> Self {
        InventoryError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl InventoryError {
    /// Create an `InvalidArgument` error.
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        InventoryError::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a `NativeOperationFailed` error.
    pub fn native(operation: impl Into<String>, code: StatusCode) -> Self {
        InventoryError::NativeOperationFailed {
            operation: operation.into(),
            code,
        }
    }

    /// Create a `ProtocolViolation` error.
    pub fn protocol(operation: impl Into<String>, message: impl Into<String>) -> Self {
        InventoryError::ProtocolViolation {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// The native status carried by a `NativeOperationFailed` error.
    pub fn native_code(&self) -> Option<StatusCode> {
        match self {
            InventoryError::NativeOperationFailed { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the error came from the native layer rather than the caller.
    ///
    /// Batch callers use this to decide whether to continue with the next
    /// input; the failure itself is always terminal for the call that raised it.
    pub fn is_native(&self) -> bool {
        matches!(
            self,
            InventoryError::NativeOperationFailed { .. } | InventoryError::ProtocolViolation { .. }
        )
    }

    /// Stable short name for logs and diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            InventoryError::InvalidArgument { .. } => "invalid_argument",
            InventoryError::ProtocolViolation { .. } => "protocol_violation",
            InventoryError::NativeOperationFailed { .. } => "native_operation_failed",
            InventoryError::Conversion { .. } => "conversion",
            InventoryError::Config { .. } => "config",
            InventoryError::Json { .. } => "json",
            InventoryError::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_code_is_exposed() {
        let err = InventoryError::native("MsiEnumProducts", StatusCode(1610));
        assert_eq!(err.native_code(), Some(StatusCode(1610)));
        assert!(err.is_native());
        assert_eq!(err.kind_name(), "native_operation_failed");
    }

    #[test]
    fn test_invalid_argument_is_not_native() {
        let err = InventoryError::invalid_argument("query", "must not be empty");
        assert_eq!(err.native_code(), None);
        assert!(!err.is_native());
        assert_eq!(err.to_string(), "Invalid argument for query: must not be empty");
    }

    #[test]
    fn test_json_conversion() {
        let err: InventoryError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, InventoryError::Json { .. }));
    }
}
