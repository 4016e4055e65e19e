use thiserror::Error;

use crate::{capture::CaptureError, http::HttpError};

/// Main application error type for smcwatch
#[derive(Debug, Error)]
pub enum SmcwatchError {
    /// Capture device/file setup errors
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// HTTP output server errors
    #[error("http output error: {0}")]
    Http(#[from] HttpError),
}

/// Type alias for Result with SmcwatchError
pub type Result<T> = std::result::Result<T, SmcwatchError>;
