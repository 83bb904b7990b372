//! Trait seams between the pipeline stages.
//!
//! - [`PageSource`]: fetch one page envelope (implemented by the HTTP executor).
//! - [`Pause`]: block for a back-off or rate-limit wait.
//! - [`DatasetSink`]: persist a named dataset while pagination is still running.
//!
//! All three are annotated for `mockall` so tests can script page sequences,
//! observe waits, and capture writes without a network or a clock.

use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::envelope::{PageResponse, Record};
use crate::error::{ExportError, FetchError};
use crate::exporter::ExportOutcome;

/// Produces one decoded envelope per URL, applying its own retry policy.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<PageResponse, FetchError>;
}

/// Waits between attempts. Nothing else proceeds while a pause is in effect.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, duration: Duration);
}

/// Production [`Pause`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Receives complete datasets that must be written before the run finishes.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait DatasetSink: Send + Sync {
    fn persist(&self, name: &str, records: &[Record]) -> Result<ExportOutcome, ExportError>;
}
