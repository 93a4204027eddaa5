use int_enum::IntEnum;
use thiserror::Error;

/// The kind of failure recorded by a [`GvoxError`]. The integer values are the
/// result codes reported by [`crate::Context::result_code`]; `0` means success.
#[repr(i32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, IntEnum, Error)]
pub enum ErrorType {
    #[error("failed to load file")]
    FailedToLoadFile = -1,
    #[error("failed to load format")]
    FailedToLoadFormat = -2,
    #[error("invalid format")]
    InvalidFormat = -3,
}

impl ErrorType {
    pub fn code(self) -> i32 {
        self.int_value()
    }
}

/// An error produced by a context operation or by a format implementation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{ty}: {message}")]
pub struct GvoxError {
    ty: ErrorType,
    message: String,
}

impl GvoxError {
    pub fn new(ty: ErrorType, message: impl Into<String>) -> Self {
        Self {
            ty,
            message: message.into(),
        }
    }

    pub fn error_type(&self) -> ErrorType {
        self.ty
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn invalid_format(message: impl Into<String>) -> Self {
        Self::new(ErrorType::InvalidFormat, message)
    }

    pub(crate) fn failed_to_load_format(message: impl Into<String>) -> Self {
        Self::new(ErrorType::FailedToLoadFormat, message)
    }
}
