//! Typed error definitions and reply codes.
//!
//! [`AhxError`] covers failures inside the core crate (config, codec, bus).
//! [`ErrorCode`] is the integer carried on every reply envelope; each crate's
//! error type maps onto it so that query handlers can answer with the right
//! code without inspecting error strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Domain-specific errors for the core crate.
#[derive(Debug, Error)]
pub enum AhxError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Gzip or base64 framing error.
    #[error("codec error: {0}")]
    Codec(String),

    /// JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reply code carried on the wire envelope.
///
/// `Blank` is a sentinel and is never sent; `Ok` is the only success code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(into = "i32", try_from = "i32")]
pub enum ErrorCode {
    #[default]
    Blank,
    Ok,
    GenericError,
    MsgJsonParseError,
    NotFound,
    UserError,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Blank => 0,
            Self::Ok => 1,
            Self::GenericError => -1,
            Self::MsgJsonParseError => -2,
            Self::NotFound => -3,
            Self::UserError => -4,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code.as_i32()
    }
}

impl TryFrom<i32> for ErrorCode {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Blank),
            1 => Ok(Self::Ok),
            -1 => Ok(Self::GenericError),
            -2 => Ok(Self::MsgJsonParseError),
            -3 => Ok(Self::NotFound),
            -4 => Ok(Self::UserError),
            other => Err(format!("unknown reply code {other}")),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blank => write!(f, "blank"),
            Self::Ok => write!(f, "ok"),
            Self::GenericError => write!(f, "generic"),
            Self::MsgJsonParseError => write!(f, "msg-json-parse-error"),
            Self::NotFound => write!(f, "not-found"),
            Self::UserError => write!(f, "user-error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_wire_values() {
        assert_eq!(ErrorCode::Blank.as_i32(), 0);
        assert_eq!(ErrorCode::Ok.as_i32(), 1);
        assert_eq!(ErrorCode::NotFound.as_i32(), -3);
        assert_eq!(ErrorCode::try_from(-4), Ok(ErrorCode::UserError));
        assert!(ErrorCode::try_from(7).is_err());
    }

    #[test]
    fn code_serializes_as_integer() {
        let json = serde_json::to_string(&ErrorCode::MsgJsonParseError).unwrap();
        assert_eq!(json, "-2");
        let back: ErrorCode = serde_json::from_str("1").unwrap();
        assert_eq!(back, ErrorCode::Ok);
    }
}
