//! Failure taxonomy for retrieval and export.
//!
//! Retryable conditions (transport failures, 5xx, 429) never surface here
//! unless the retry budget is spent; everything in [`FetchError`] is final for
//! the run. CSV encoding problems are recovered inside the exporter and have
//! no variant.

use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

const API_KEY_HINT: &str = "Access forbidden. The API may require an API key or other authentication.\nTry using the --api-key option if you have an API key.";

#[derive(Debug, Error)]
pub enum FetchError {
    /// DNS, connect, timeout or body-read failure on every allowed attempt.
    #[error("request to {url} failed after {attempts} attempts: {source}")]
    Transport {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// 5xx on every allowed attempt.
    #[error("server error {status} after {attempts} attempts: {body}")]
    Server {
        status: StatusCode,
        body: String,
        attempts: u32,
    },

    /// 403. Never retried.
    #[error("HTTP error 403 Forbidden: {body}")]
    Forbidden { body: String },

    /// Any other non-success status.
    #[error("HTTP error {status}: {body}")]
    Client { status: StatusCode, body: String },

    /// The body was not JSON, or not shaped like an envelope.
    #[error("error decoding JSON response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// The envelope reported `success: false`.
    #[error("API error: {message}")]
    Api { message: String },

    /// A statistics dimension could not be written mid-run.
    #[error("failed to persist dataset: {0}")]
    Persist(#[from] ExportError),

    /// The HTTP client or request URL could not be built.
    #[error("invalid request setup: {0}")]
    Setup(String),
}

impl FetchError {
    /// Follow-up advice printed after the diagnostic, if any.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            FetchError::Forbidden { .. } => Some(API_KEY_HINT),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
