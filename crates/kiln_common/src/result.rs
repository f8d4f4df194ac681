//! Common result and error types for the Kiln compiler.

use std::fmt;

/// The standard result type for fallible internal operations.
///
/// `Err` indicates an internal invariant violation (a bug in Kiln), not a
/// problem with the shader or pipeline the caller submitted.
pub type KilnResult<T> = Result<T, InternalError>;

/// An internal compiler error indicating a bug, not a user input problem.
#[derive(Debug, thiserror::Error)]
#[error("internal compiler error: {message}")]
pub struct InternalError {
    /// Description of the internal error.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

/// Enum-valued result code reported across the public compiler boundary.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ResultCode {
    /// The operation completed.
    Success,
    /// A shader was malformed, had no matching entry point, or failed to compile.
    ErrorInvalidShader,
    /// An argument or option value was invalid.
    ErrorInvalidValue,
    /// An allocation for the output failed.
    ErrorOutOfMemory,
    /// A required input reference was missing.
    ErrorInvalidPointer,
    /// The input uses a feature this compiler does not support.
    Unsupported,
    /// An unclassified failure.
    ErrorUnknown,
}

impl ResultCode {
    /// Returns `true` for [`ResultCode::Success`].
    pub fn is_success(self) -> bool {
        self == ResultCode::Success
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultCode::Success => "Success",
            ResultCode::ErrorInvalidShader => "ErrorInvalidShader",
            ResultCode::ErrorInvalidValue => "ErrorInvalidValue",
            ResultCode::ErrorOutOfMemory => "ErrorOutOfMemory",
            ResultCode::ErrorInvalidPointer => "ErrorInvalidPointer",
            ResultCode::Unsupported => "Unsupported",
            ResultCode::ErrorUnknown => "ErrorUnknown",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let err = InternalError::new("something broke");
        assert_eq!(format!("{err}"), "internal compiler error: something broke");
    }

    #[test]
    fn err_path() {
        let r: KilnResult<i32> = Err(InternalError::new("test error"));
        let err = r.err().unwrap();
        assert_eq!(err.message, "test error");
    }

    #[test]
    fn from_string() {
        let err: InternalError = "from string".to_string().into();
        assert_eq!(err.message, "from string");
    }

    #[test]
    fn result_code_display() {
        assert_eq!(ResultCode::ErrorInvalidShader.to_string(), "ErrorInvalidShader");
        assert!(ResultCode::Success.is_success());
        assert!(!ResultCode::Unsupported.is_success());
    }
}
