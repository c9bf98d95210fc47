use std::fmt;
use thiserror::Error;
use url::{Host, Url};

use super::host::{HostClassifier, HostError, ResolutionError, Resolve};

/// Which URL in the fetch chain is being checked.
///
/// Only affects error messages; every label runs the same checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlLabel {
    Feed,
    Redirect,
    Final,
}

impl fmt::Display for UrlLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UrlLabel::Feed => "Feed URL",
            UrlLabel::Redirect => "Redirect URL",
            UrlLabel::Final => "Final URL",
        };
        f.write_str(label)
    }
}

/// Errors that can occur during URL validation.
///
/// These errors cover both parsing failures and security policy violations
/// designed to prevent SSRF (Server-Side Request Forgery) attacks.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("{label} is not a valid URL: {source}")]
    InvalidUrl {
        label: UrlLabel,
        #[source]
        source: url::ParseError,
    },
    /// The URL uses a scheme other than http or https.
    #[error("{label} must use http or https (got {scheme})")]
    UnsupportedScheme { label: UrlLabel, scheme: String },
    /// The URL has no host component.
    #[error("{label} must include a hostname")]
    MissingHost { label: UrlLabel },
    /// The host is localhost or resolves to a non-public address.
    #[error("{label} host {reason}")]
    Host {
        label: UrlLabel,
        #[source]
        reason: HostError,
    },
    /// DNS lookup for the host failed.
    #[error("{source}")]
    Unresolvable {
        label: UrlLabel,
        #[source]
        source: ResolutionError,
    },
}

/// A URL that passed validation at the moment it was checked.
///
/// Guarantees an http(s) scheme and a host whose addresses were all public
/// when resolved. DNS may change afterwards; the transport performs its own
/// lookup when connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUrl(Url);

impl ValidatedUrl {
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn into_url(self) -> Url {
        self.0
    }
}

impl fmt::Display for ValidatedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Validates candidate fetch targets against scheme and public-reachability rules.
///
/// The same validator checks the user-supplied feed URL, every redirect target,
/// and the URL a response finally landed on.
#[derive(Debug, Clone, Default)]
pub struct UrlValidator<R> {
    classifier: HostClassifier<R>,
}

impl<R: Resolve> UrlValidator<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            classifier: HostClassifier::new(resolver),
        }
    }

    /// Validates a URL string for use as a fetch target.
    ///
    /// Performs security-focused validation to prevent SSRF attacks by rejecting:
    /// - Non-HTTP(S) schemes (e.g., `file://`, `ftp://`)
    /// - URLs without a host
    /// - `localhost` and `localhost.localdomain` (no lookup performed)
    /// - Hosts with any resolved address that is not public
    ///
    /// # Errors
    ///
    /// Returns [`UrlValidationError`] naming `label` in its message.
    pub async fn validate(
        &self,
        raw: &str,
        label: UrlLabel,
    ) -> Result<ValidatedUrl, UrlValidationError> {
        let url = Url::parse(raw).map_err(|source| UrlValidationError::InvalidUrl { label, source })?;
        self.validate_parsed(url, label).await
    }

    /// Same checks as [`UrlValidator::validate`] for an already-parsed URL.
    pub async fn validate_parsed(
        &self,
        url: Url,
        label: UrlLabel,
    ) -> Result<ValidatedUrl, UrlValidationError> {
        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(UrlValidationError::UnsupportedScheme {
                    label,
                    scheme: scheme.to_owned(),
                })
            }
        }

        // IPv6 literals come back without brackets so they parse as addresses
        let hostname = match url.host() {
            Some(Host::Domain(domain)) => domain.trim().to_lowercase(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => String::new(),
        };
        if hostname.is_empty() {
            return Err(UrlValidationError::MissingHost { label });
        }

        self.classifier
            .ensure_public(&hostname)
            .await
            .map_err(|reason| match reason {
                HostError::Resolution(source) => UrlValidationError::Unresolvable { label, source },
                reason => UrlValidationError::Host { label, reason },
            })?;

        tracing::debug!(label = %label, url = %url, "URL validated");
        Ok(ValidatedUrl(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::testing::StaticResolver;

    fn validator() -> UrlValidator<StaticResolver> {
        UrlValidator::new(
            StaticResolver::default()
                .with("example.com", &["93.184.216.34"])
                .with("news.example.org", &["93.184.216.35", "2606:2800:220:1::1"])
                .with("intranet.example", &["10.0.0.7"])
                .with("split.example", &["93.184.216.34", "127.0.0.1"]),
        )
    }

    #[tokio::test]
    async fn test_valid_urls() {
        let v = validator();
        assert!(v.validate("https://example.com/feed.xml", UrlLabel::Feed).await.is_ok());
        assert!(v.validate("http://news.example.org", UrlLabel::Feed).await.is_ok());
    }

    #[tokio::test]
    async fn test_valid_url_with_port_accepted() {
        let url = validator()
            .validate("https://example.com:8443/feed.xml", UrlLabel::Feed)
            .await
            .unwrap();
        assert_eq!(url.as_url().port(), Some(8443));
    }

    #[tokio::test]
    async fn test_hostname_is_lowercased() {
        let url = validator()
            .validate("https://EXAMPLE.com/Feed", UrlLabel::Feed)
            .await
            .unwrap();
        assert_eq!(url.as_str(), "https://example.com/Feed");
    }

    #[tokio::test]
    async fn test_invalid_schemes() {
        let v = validator();
        for raw in ["file:///etc/passwd", "ftp://example.com", "gopher://example.com"] {
            let err = v.validate(raw, UrlLabel::Feed).await.unwrap_err();
            assert!(matches!(err, UrlValidationError::UnsupportedScheme { .. }), "{raw}");
        }
    }

    #[tokio::test]
    async fn test_unparseable_url() {
        let err = validator().validate("not a url", UrlLabel::Feed).await.unwrap_err();
        assert!(matches!(err, UrlValidationError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_localhost_rejected() {
        let v = validator();
        assert!(v.validate("http://localhost/feed", UrlLabel::Feed).await.is_err());
        assert!(v.validate("http://LocalHost.LocalDomain/feed", UrlLabel::Feed).await.is_err());
        assert!(v.validate("http://127.0.0.1/feed", UrlLabel::Feed).await.is_err());
        assert!(v.validate("http://[::1]/feed", UrlLabel::Feed).await.is_err());
        assert_eq!(v.classifier_calls(), 0);
    }

    #[tokio::test]
    async fn test_private_ips_rejected() {
        let v = validator();
        for raw in [
            "http://192.168.1.1/feed",
            "http://10.0.0.1:3000/feed",
            "http://172.16.0.1/feed",
            "http://169.254.169.254/latest/meta-data",
            "http://[fe80::1]/feed",
            "http://0.0.0.0/feed",
        ] {
            assert!(v.validate(raw, UrlLabel::Feed).await.is_err(), "{raw}");
        }
    }

    #[tokio::test]
    async fn test_hostname_resolving_privately_rejected() {
        let err = validator()
            .validate("https://intranet.example/rss", UrlLabel::Redirect)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Redirect URL host resolves to a non-public IP address (10.0.0.7 is private)"
        );
    }

    #[tokio::test]
    async fn test_any_non_public_answer_rejects() {
        let err = validator()
            .validate("https://split.example/rss", UrlLabel::Feed)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UrlValidationError::Host {
                reason: HostError::NonPublic { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unresolvable_host_rejected() {
        let err = validator()
            .validate("https://missing.example/rss", UrlLabel::Final)
            .await
            .unwrap_err();
        assert!(matches!(err, UrlValidationError::Unresolvable { label: UrlLabel::Final, .. }));
        assert_eq!(err.to_string(), "Unable to resolve host: missing.example");
    }

    #[tokio::test]
    async fn test_label_only_changes_message() {
        let v = validator();
        for label in [UrlLabel::Feed, UrlLabel::Redirect, UrlLabel::Final] {
            assert!(v.validate("https://example.com/", label).await.is_ok());
            let err = v.validate("http://localhost/", label).await.unwrap_err();
            assert!(err.to_string().starts_with(&label.to_string()));
        }
    }

    impl UrlValidator<StaticResolver> {
        fn classifier_calls(&self) -> usize {
            self.classifier.resolver_calls()
        }
    }
}
