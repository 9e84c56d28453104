//! HTTP reporting of readings to the collector.
//!
//! Delivery is at-most-once: a failed POST is logged and dropped, and the
//! next cycle sends a fresh reading. There is no queue of unsent readings.

use std::time::Duration;

use iotclient_config::AppConfig;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, error, info, warn};

use crate::BoxFuture;
use crate::reading::{FORM_CONTENT_TYPE, PayloadError, Reading};

/// Errors from reporting a reading.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("cannot encode reading: {0}")]
    Payload(#[from] PayloadError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("invalid endpoint: {0}")]
    Endpoint(String),

    #[error("transport failure: {0}")]
    Transport(#[source] reqwest::Error),
}

impl ReportError {
    /// Whether the request hit the configured timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }
}

/// Destination for readings.
///
/// `Ok` carries whatever status the collector answered with, including
/// error statuses: a reachable server counts as "sent".
pub trait Reporter: Send + Sync {
    fn send(&self, reading: Reading) -> BoxFuture<'_, Result<StatusCode, ReportError>>;
}

/// [`Reporter`] that POSTs form-encoded readings with `reqwest`.
pub struct HttpReporter {
    client: Client,
    url: Url,
}

impl HttpReporter {
    /// Create a reporter for `url` whose requests give up after `timeout`.
    pub fn new(url: Url, timeout: Duration) -> Result<Self, ReportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ReportError::Client)?;
        Ok(Self { client, url })
    }

    /// Create a reporter from the `[endpoint]` section.
    pub fn from_config(config: &AppConfig) -> Result<Self, ReportError> {
        let url = config
            .endpoint_url()
            .map_err(|e| ReportError::Endpoint(e.to_string()))?;
        Self::new(url, config.endpoint.timeout())
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Reporter for HttpReporter {
    fn send(&self, reading: Reading) -> BoxFuture<'_, Result<StatusCode, ReportError>> {
        Box::pin(async move {
            let body = reading.form_body().inspect_err(|e| {
                error!(error = %e, "dropping reading that cannot be encoded");
            })?;
            debug!(url = %self.url, body = %body, "sending reading");

            let resp = self
                .client
                .post(self.url.clone())
                .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
                .body(body)
                .send()
                .await
                .map_err(|e| {
                    error!(url = %self.url, error = %e, timeout = e.is_timeout(), "failed to send reading");
                    ReportError::Transport(e)
                })?;

            let status = resp.status();
            if status.is_success() {
                info!(status = status.as_u16(), "reading sent");
            } else {
                warn!(status = status.as_u16(), "collector answered with an error status");
            }
            Ok(status)
        })
    }
}
