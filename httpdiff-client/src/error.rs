use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid url: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),
    #[error("invalid request: {0}")]
    Request(#[from] http::Error),
    #[error("transport error: {0}")]
    Transport(#[from] hyper::Error),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("data request failed, code: {0}")]
    Status(u16),
    #[error("response body exceeds {0} bytes")]
    BodyTooLarge(usize),
    #[error("could not encode form body: {0}")]
    Form(#[from] serde_urlencoded::ser::Error),
    #[error("could not encode or decode json: {0}")]
    Json(#[from] serde_json::Error),
}
