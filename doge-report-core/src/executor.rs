//! Single-request execution with the API's retry policy.
//!
//! [`RequestExecutor`] issues one GET at a time and classifies the outcome:
//!
//! | Outcome                         | Handling                                                  |
//! |---------------------------------|-----------------------------------------------------------|
//! | 2xx with a JSON body            | returned                                                  |
//! | 2xx with a non-JSON body        | fatal, [`FetchError::Decode`] (lone surrogates repaired)  |
//! | transport failure, status ≥ 500 | retried after `2^attempt` seconds, up to `max_retries`    |
//! | 429                             | retried after `Retry-After` (or 5s); budget starts over   |
//! | 403                             | fatal, [`FetchError::Forbidden`] with the API-key hint    |
//! | any other status                | fatal, [`FetchError::Client`]                             |
//!
//! The retry loop is iterative; the attempt counter is the only state and is
//! dropped when the call returns.

use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER,
};
use reqwest::{Response, StatusCode, Url};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::{FetchConfig, USER_AGENT};
use crate::contract::{PageSource, Pause, TokioPause};
use crate::envelope::{self, PageResponse};
use crate::error::FetchError;

/// Wait applied to a 429 that carries no usable `Retry-After`.
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(5);

/// What the executor does with a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Accept,
    RateLimited,
    Forbidden,
    Retry,
    Fatal,
}

pub fn classify(status: StatusCode) -> Disposition {
    if status.is_success() {
        Disposition::Accept
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Disposition::RateLimited
    } else if status == StatusCode::FORBIDDEN {
        Disposition::Forbidden
    } else if status.as_u16() >= 500 {
        Disposition::Retry
    } else {
        Disposition::Fatal
    }
}

/// `Retry-After` as whole seconds, else [`DEFAULT_RATE_LIMIT_WAIT`].
pub fn rate_limit_wait(retry_after: Option<&HeaderValue>) -> Duration {
    retry_after
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RATE_LIMIT_WAIT)
}

/// Back-off before retry number `attempt` (1-based): 2, 4, 8, ... seconds.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}

enum Failure {
    Transient(Transient),
    RateLimited(Duration),
    Fatal(FetchError),
}

enum Transient {
    Transport(reqwest::Error),
    Server { status: StatusCode, body: String },
}

impl Transient {
    fn into_error(self, url: &Url, attempts: u32) -> FetchError {
        match self {
            Transient::Transport(source) => FetchError::Transport {
                url: url.to_string(),
                attempts,
                source,
            },
            Transient::Server { status, body } => FetchError::Server {
                status,
                body,
                attempts,
            },
        }
    }

    fn describe(&self) -> String {
        match self {
            Transient::Transport(e) => format!("connection error: {e}"),
            Transient::Server { status, .. } => format!("server error {status}"),
        }
    }
}

/// Issues GET requests against the API with auth, proxy and retry handling.
pub struct RequestExecutor<P = TokioPause> {
    client: reqwest::Client,
    max_retries: u32,
    pause: P,
}

impl RequestExecutor<TokioPause> {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        Self::with_pause(config, TokioPause)
    }
}

impl<P: Pause> RequestExecutor<P> {
    pub fn with_pause(config: &FetchConfig, pause: P) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &config.api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| FetchError::Setup(format!("API key is not a valid header value: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(config.timeout);

        // The resolved config is the only proxy source; ambient env vars were folded in upstream.
        builder = match &config.proxy {
            Some(proxy_url) => {
                let proxy = reqwest::Proxy::all(proxy_url.as_str()).map_err(|e| {
                    error!(proxy = %proxy_url, error = %e, "Invalid proxy URL");
                    FetchError::Setup(format!("invalid proxy URL {proxy_url}: {e}"))
                })?;
                info!(proxy = %proxy_url, "Using proxy");
                builder.proxy(proxy)
            }
            None => builder.no_proxy(),
        };

        let client = builder
            .build()
            .map_err(|e| FetchError::Setup(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
            pause,
        })
    }

    /// Fetch `url` and decode the envelope, retrying per the module policy.
    pub async fn execute(&self, url: &Url) -> Result<PageResponse, FetchError> {
        let mut retries: u32 = 0;
        loop {
            debug!(url = %url, attempt = retries + 1, "Issuing request");
            match self.attempt(url).await {
                Ok(page) => {
                    if retries > 0 {
                        info!(url = %url, attempts = retries + 1, "Request succeeded after retry");
                    }
                    return Ok(page);
                }
                Err(Failure::RateLimited(wait)) => {
                    warn!(
                        url = %url,
                        wait_secs = wait.as_secs(),
                        "Rate limit exceeded, waiting before retrying"
                    );
                    self.pause.pause(wait).await;
                    retries = 0;
                }
                Err(Failure::Transient(cause)) if retries < self.max_retries => {
                    retries += 1;
                    let wait = backoff_delay(retries);
                    warn!(
                        url = %url,
                        cause = %cause.describe(),
                        attempt = retries,
                        max_retries = self.max_retries,
                        wait_secs = wait.as_secs(),
                        "Request failed, retrying"
                    );
                    self.pause.pause(wait).await;
                }
                Err(Failure::Transient(cause)) => {
                    error!(
                        url = %url,
                        cause = %cause.describe(),
                        attempts = retries + 1,
                        "Request failed after all retry attempts"
                    );
                    return Err(cause.into_error(url, retries + 1));
                }
                Err(Failure::Fatal(e)) => {
                    error!(url = %url, error = %e, "Request failed with non-retryable error");
                    return Err(e);
                }
            }
        }
    }

    async fn attempt(&self, url: &Url) -> Result<PageResponse, Failure> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Failure::Transient(Transient::Transport(e)))?;

        let status = response.status();
        match classify(status) {
            Disposition::Accept => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| Failure::Transient(Transient::Transport(e)))?;
                envelope::decode(&body).map_err(|source| {
                    Failure::Fatal(FetchError::Decode {
                        url: url.to_string(),
                        source,
                    })
                })
            }
            Disposition::RateLimited => {
                let wait = rate_limit_wait(response.headers().get(RETRY_AFTER));
                Err(Failure::RateLimited(wait))
            }
            Disposition::Forbidden => {
                let body = read_body(response).await;
                warn!(status = %status, body = %body, "Access forbidden");
                Err(Failure::Fatal(FetchError::Forbidden { body }))
            }
            Disposition::Retry => {
                let body = read_body(response).await;
                warn!(status = %status, body = %body, "Server returned error");
                Err(Failure::Transient(Transient::Server { status, body }))
            }
            Disposition::Fatal => {
                let body = read_body(response).await;
                Err(Failure::Fatal(FetchError::Client { status, body }))
            }
        }
    }
}

async fn read_body(response: Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<Failed to decode response body>"))
}

#[async_trait]
impl<P: Pause> PageSource for RequestExecutor<P> {
    async fn fetch(&self, url: &Url) -> Result<PageResponse, FetchError> {
        self.execute(url).await
    }
}
