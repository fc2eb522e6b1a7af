use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

const MAX_BODY_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors from reaching a feed or an enrichment page.
///
/// Nothing here is retried; the next poll cycle is the only second attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Body is not valid UTF-8
    #[error("Response body is not valid UTF-8")]
    InvalidUtf8,
}

/// Body and status of a successful GET.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub body: String,
    pub status: u16,
}

/// Thin GET client shared by the poller and the image enricher.
///
/// Cloning is cheap; `reqwest::Client` is reference counted.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Builds a client with the given user agent.
    pub fn with_user_agent(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self::new(client, timeout))
    }

    /// Fetches `url` and returns its body as text.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Timeout`] - no complete response within the timeout
    /// - [`FetchError::Network`] - connection or TLS errors
    /// - [`FetchError::HttpStatus`] - any non-2xx response
    /// - [`FetchError::ResponseTooLarge`] - body exceeded 10MB
    /// - [`FetchError::InvalidUtf8`] - body is not text
    pub async fn get(&self, url: &str) -> Result<FetchedBody, FetchError> {
        let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url = %url, status = %status, "Non-success response");
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let bytes = tokio::time::timeout(self.timeout, read_limited_bytes(response, MAX_BODY_SIZE))
            .await
            .map_err(|_| FetchError::Timeout)??;
        let body = String::from_utf8(bytes).map_err(|_| FetchError::InvalidUtf8)?;

        Ok(FetchedBody {
            body,
            status: status.as_u16(),
        })
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
