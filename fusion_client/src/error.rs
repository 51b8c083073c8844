//! The single error type surfaced by every host operation.

pub use fusion_native::ErrorCode;
use fusion_native::ErrorInfoData;
use thiserror::Error;

/// A failed operation: validation, dispatch, execution, or decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct FusionError {
    code: ErrorCode,
    message: String,
}

/// Result alias used throughout the crate.
pub type Result<T, E = FusionError> = std::result::Result<T, E>;

impl FusionError {
    /// Build an error from a code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The closed error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// The message text exactly as reported.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidState, message)
    }

    pub(crate) fn decode(error: impl std::fmt::Display) -> Self {
        Self::new(ErrorCode::DecodeError, error.to_string())
    }

    pub(crate) fn abandoned(token: u64) -> Self {
        Self::new(
            ErrorCode::Abandoned,
            format!("operation {token:#x} completed without delivering a result"),
        )
    }

    /// A non-`Ok` status returned synchronously by a native entry point.
    pub(crate) fn rejected(operation: &str, status: ErrorCode) -> Self {
        Self::new(status, format!("{operation} was rejected by the engine"))
    }

    /// Decode a native error payload.
    ///
    /// # Safety
    /// The message span must be readable for the duration of the call.
    pub(crate) unsafe fn from_native(info: &ErrorInfoData) -> Self {
        let message = info
            .message
            .as_opt_slice()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default();
        Self::new(ErrorCode::from_raw(info.code), message)
    }
}
