use futures::StreamExt;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, LOCATION, USER_AGENT};
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::util::{Resolve, UrlLabel, UrlValidationError, UrlValidator, ValidatedUrl};

/// Upper bound on the whole exchange: every hop plus the body.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
/// Same hop limit reqwest's default redirect policy applies.
const MAX_REDIRECTS: usize = 10;

const USER_AGENT_VALUE: &str = concat!("feed2md/", env!("CARGO_PKG_VERSION"));
const ACCEPT_FEEDS: &str = "application/rss+xml, application/atom+xml, application/xml, text/xml, */*";
const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.9";

/// Errors that can occur while fetching a feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// A redirect target or the final URL failed validation
    #[error(transparent)]
    Validation(#[from] UrlValidationError),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[source] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// The fetch did not finish within the timeout
    #[error("Request timed out")]
    Timeout,
    /// Redirect chain longer than the hop limit
    #[error("Too many redirects (limit {0})")]
    TooManyRedirects(usize),
    /// `Location` header that is not valid text
    #[error("Redirect location is not valid UTF-8")]
    InvalidLocation,
    /// Response body exceeded the size limit (10MB by default)
    #[error("Response too large")]
    ResponseTooLarge,
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(e)
        }
    }
}

/// Decides whether each redirect hop, and the URL a response lands on, may be used.
///
/// The fetcher consults the policy before requesting any redirect target, so
/// a rejected hop costs no further network traffic.
pub trait RedirectPolicy {
    /// Resolves `location` against `current` and returns the URL to request next.
    fn check_hop(
        &self,
        current: &Url,
        location: &str,
    ) -> impl Future<Output = Result<Url, UrlValidationError>>;

    /// Checks the URL of the response whose body will be read.
    fn check_final(&self, landed: &Url) -> impl Future<Output = Result<(), UrlValidationError>>;
}

/// Allows only hops whose targets pass [`UrlValidator`].
#[derive(Debug)]
pub struct PublicOnlyPolicy<'a, R> {
    validator: &'a UrlValidator<R>,
}

impl<'a, R: Resolve> PublicOnlyPolicy<'a, R> {
    pub fn new(validator: &'a UrlValidator<R>) -> Self {
        Self { validator }
    }
}

impl<R: Resolve> RedirectPolicy for PublicOnlyPolicy<'_, R> {
    async fn check_hop(&self, current: &Url, location: &str) -> Result<Url, UrlValidationError> {
        let label = UrlLabel::Redirect;
        let target = current
            .join(location)
            .map_err(|source| UrlValidationError::InvalidUrl { label, source })?;
        let validated = self.validator.validate_parsed(target, label).await?;
        Ok(validated.into_url())
    }

    async fn check_final(&self, landed: &Url) -> Result<(), UrlValidationError> {
        self.validator
            .validate_parsed(landed.clone(), UrlLabel::Final)
            .await
            .map(|_| ())
    }
}

/// Client settings the fetcher relies on: no automatic redirects, bounded time.
///
/// Callers may add further options (tests pin hostnames with `resolve`).
pub fn client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(FETCH_TIMEOUT)
}

/// Performs the single GET for a feed, gating every redirect hop.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_body_size: usize,
}

impl FeedFetcher {
    /// Builds a fetcher over a client from [`client_builder`].
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, FetchError> {
        Ok(Self::with_client(client_builder().build()?))
    }

    /// Uses a caller-configured client (caller controls configuration).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: FETCH_TIMEOUT,
            max_body_size: MAX_FEED_SIZE,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Caps the number of body bytes read from the final response.
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// Fetches the feed body at `url`.
    ///
    /// Redirects (301, 302, 303, 307, 308) are followed here rather than by the
    /// transport: each `Location` goes through `policy.check_hop` before it is
    /// requested. The URL of the final response goes through `policy.check_final`
    /// before its body is read. No retries are attempted.
    ///
    /// Hostnames are validated by name; the transport resolves them again when
    /// connecting, so an answer that changes between the two lookups is not
    /// detected here.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Validation`] - A redirect target or the final URL was rejected
    /// - [`FetchError::Timeout`] - The whole exchange exceeded the timeout
    /// - [`FetchError::HttpStatus`] - Non-2xx final response
    /// - [`FetchError::TooManyRedirects`] - More than 10 hops
    /// - [`FetchError::ResponseTooLarge`] - Body exceeded the size cap
    /// - [`FetchError::Network`] - Connection or TLS errors
    pub async fn fetch<P: RedirectPolicy>(
        &self,
        url: &ValidatedUrl,
        policy: &P,
    ) -> Result<Vec<u8>, FetchError> {
        tokio::time::timeout(self.timeout, self.fetch_following(url, policy))
            .await
            .map_err(|_| FetchError::Timeout)?
    }

    async fn fetch_following<P: RedirectPolicy>(
        &self,
        url: &ValidatedUrl,
        policy: &P,
    ) -> Result<Vec<u8>, FetchError> {
        let mut current = url.as_url().clone();
        let mut redirects = 0;

        loop {
            let response = self
                .client
                .get(current.clone())
                .header(USER_AGENT, USER_AGENT_VALUE)
                .header(ACCEPT, ACCEPT_FEEDS)
                .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE)
                .send()
                .await?;

            let status = response.status();
            if is_followable(status) {
                let Some(location) = response.headers().get(LOCATION) else {
                    return Err(FetchError::HttpStatus(status.as_u16()));
                };
                if redirects >= MAX_REDIRECTS {
                    return Err(FetchError::TooManyRedirects(MAX_REDIRECTS));
                }
                let location = location.to_str().map_err(|_| FetchError::InvalidLocation)?;

                let next = policy.check_hop(&current, location).await?;
                tracing::info!(
                    status = status.as_u16(),
                    from = %current,
                    to = %next,
                    "Following redirect"
                );
                current = next;
                redirects += 1;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }

            // The transport may have been configured to follow redirects itself
            policy.check_final(response.url()).await?;

            let bytes = read_limited_bytes(response, self.max_body_size).await?;
            tracing::debug!(url = %current, bytes = bytes.len(), redirects, "Fetched feed");
            return Ok(bytes);
        }
    }
}

fn is_followable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Reads the body, refusing more than `limit` bytes.
///
/// A body shorter than its declared Content-Length is reported by the
/// transport as a [`FetchError::Network`] error while streaming.
async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
