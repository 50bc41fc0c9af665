use thiserror::Error;

use crate::types::RunStatus;

pub type Result<T> = std::result::Result<T, ApifyError>;

#[derive(Debug, Error)]
pub enum ApifyError {
    /// Connection, TLS or timeout failure before a response arrived.
    #[error("Network error: {0}")]
    Network(String),

    /// Apify answered with a non-success status.
    #[error("Apify returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The response body did not have the expected shape.
    #[error("Unexpected response body: {0}")]
    Parse(String),

    #[error("Actor run {run_id} ended as {status}")]
    RunFailed { run_id: String, status: RunStatus },
}

impl From<reqwest::Error> for ApifyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ApifyError::Parse(err.to_string());
        }
        ApifyError::Network(err.to_string())
    }
}
