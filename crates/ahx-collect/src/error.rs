use ahx_core::error::ErrorCode;
use ahx_core::types::RealmKey;
use ahx_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Socket could not be established or the request failed in flight.
    #[error("transport error for {url}: {reason}")]
    Transport { url: String, reason: String },

    /// Malformed gzip framing or an unreadable body.
    #[error("decode error for {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("auction info for {0} lists no files")]
    EmptyFiles(RealmKey),

    #[error("region {0:?} has no hostname")]
    EmptyRegion(String),

    #[error("access token: {0}")]
    Auth(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FetchError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Status { status: 404, .. } => ErrorCode::NotFound,
            Self::Store(e) => e.code(),
            _ => ErrorCode::GenericError,
        }
    }
}
