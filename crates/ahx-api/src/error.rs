use ahx_core::bus::Message;
use ahx_core::error::{AhxError, ErrorCode};
use ahx_store::StoreError;
use thiserror::Error;

/// A failed request: the reply code plus the error string sent back.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct HandlerError {
    pub code: ErrorCode,
    pub message: String,
}

impl HandlerError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn user(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UserError, message)
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::GenericError, message)
    }

    pub fn parse(err: &serde_json::Error) -> Self {
        Self::new(ErrorCode::MsgJsonParseError, err.to_string())
    }

    pub fn into_message(self) -> Message {
        Message::error(self.code, self.message)
    }
}

impl From<StoreError> for HandlerError {
    fn from(e: StoreError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

impl From<AhxError> for HandlerError {
    fn from(e: AhxError) -> Self {
        Self::generic(e.to_string())
    }
}
