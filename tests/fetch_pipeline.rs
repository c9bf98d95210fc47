//! Integration tests for the fetch, parse, render and write pipeline.
//!
//! Each test starts its own wiremock server. Hostnames are answered by a
//! fixed resolver (public addresses unless listed as internal) while the HTTP
//! client is pinned to the mock server, so no real DNS is involved.

use std::collections::HashMap;
use std::io;
use std::net::IpAddr;

use feed2md::config::{RenderConfig, Template};
use feed2md::feed::{client_builder, parse_feed, FeedFetcher, FetchError, PublicOnlyPolicy};
use feed2md::output::write_atomic;
use feed2md::render::render_markdown;
use feed2md::util::{Resolve, UrlLabel, UrlValidationError, UrlValidator, Workspace};
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct FixedResolver(HashMap<&'static str, IpAddr>);

impl Resolve for FixedResolver {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        self.0
            .get(host)
            .map(|ip| vec![*ip])
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such host"))
    }
}

fn validator() -> UrlValidator<FixedResolver> {
    UrlValidator::new(FixedResolver(HashMap::from([
        ("news.test", "203.0.114.10".parse().unwrap()),
        ("cdn.test", "198.51.101.20".parse().unwrap()),
        ("metadata.test", "169.254.169.254".parse().unwrap()),
    ])))
}

fn fetcher(server: &MockServer) -> FeedFetcher {
    let client = client_builder()
        .resolve("news.test", *server.address())
        .resolve("cdn.test", *server.address())
        .resolve("metadata.test", *server.address())
        .build()
        .unwrap();
    FeedFetcher::with_client(client)
}

fn url(server: &MockServer, host: &str, path: &str) -> String {
    format!("http://{host}:{}{path}", server.address().port())
}

const RSS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Project &amp; News</title>
    <item>
      <title>Release 1.2</title>
      <link>https://news.test/1.2</link>
      <description>Plain description</description>
      <content:encoded><![CDATA[<p>Bug fixes and <b>speedups</b>.</p>]]></content:encoded>
      <pubDate>Tue, 07 Jan 2025 10:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Roadmap</title>
      <description>What comes next</description>
    </item>
    <item>
      <title>Older post</title>
      <link>https://news.test/old</link>
    </item>
  </channel>
</rss>"#;

const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom News</title>
  <entry>
    <title>First</title>
    <link rel="self" href="https://news.test/api/1"/>
    <link rel="alternate" href="https://news.test/posts/1"/>
    <summary>Short &lt;em&gt;summary&lt;/em&gt;</summary>
    <content>Long content</content>
    <published>2025-01-01T00:00:00Z</published>
    <updated>2025-01-02T00:00:00Z</updated>
  </entry>
</feed>"#;

async fn mount_feed(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/rss+xml")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

fn full_config() -> RenderConfig {
    RenderConfig {
        template: Template::Full,
        include_summary: true,
        summary_max_length: 280,
        limit: 0,
    }
}

// ============================================================================
// End-to-end rendering
// ============================================================================

#[tokio::test]
async fn test_rss_feed_rendered_full() {
    let server = MockServer::start().await;
    mount_feed(&server, "/feed.xml", RSS).await;

    let validator = validator();
    let feed_url = validator
        .validate(&url(&server, "news.test", "/feed.xml"), UrlLabel::Feed)
        .await
        .unwrap();
    let bytes = fetcher(&server)
        .fetch(&feed_url, &PublicOnlyPolicy::new(&validator))
        .await
        .unwrap();
    let document = parse_feed(&bytes).unwrap();

    assert_eq!(
        render_markdown(&document, &full_config()),
        "# Project & News\n\
         \n\
         ## [Release 1.2](https://news.test/1.2)\n\
         - Published: Tue, 07 Jan 2025 10:00:00 GMT\n\
         \n\
         Bug fixes and speedups.\n\
         \n\
         ## Roadmap\n\
         \n\
         What comes next\n\
         \n\
         ## [Older post](https://news.test/old)\n"
    );
}

#[tokio::test]
async fn test_rss_feed_rendered_short_with_limit() {
    let server = MockServer::start().await;
    mount_feed(&server, "/feed.xml", RSS).await;

    let validator = validator();
    let feed_url = validator
        .validate(&url(&server, "news.test", "/feed.xml"), UrlLabel::Feed)
        .await
        .unwrap();
    let bytes = fetcher(&server)
        .fetch(&feed_url, &PublicOnlyPolicy::new(&validator))
        .await
        .unwrap();
    let document = parse_feed(&bytes).unwrap();

    let config = RenderConfig {
        limit: 2,
        ..RenderConfig::default()
    };
    assert_eq!(
        render_markdown(&document, &config),
        "# Project & News\n\
         \n\
         - [Release 1.2](https://news.test/1.2) (Tue, 07 Jan 2025 10:00:00 GMT)\n\
         - Roadmap\n"
    );
}

#[tokio::test]
async fn test_atom_feed_through_redirect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/atom"))
        .respond_with(
            ResponseTemplate::new(301)
                .insert_header("location", url(&server, "cdn.test", "/atom.xml").as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_feed(&server, "/atom.xml", ATOM).await;

    let validator = validator();
    let feed_url = validator
        .validate(&url(&server, "news.test", "/atom"), UrlLabel::Feed)
        .await
        .unwrap();
    let bytes = fetcher(&server)
        .fetch(&feed_url, &PublicOnlyPolicy::new(&validator))
        .await
        .unwrap();
    let document = parse_feed(&bytes).unwrap();

    assert_eq!(
        render_markdown(&document, &full_config()),
        "# Atom News\n\
         \n\
         ## [First](https://news.test/posts/1)\n\
         - Published: 2025-01-02T00:00:00Z\n\
         \n\
         Short summary\n"
    );
}

#[tokio::test]
async fn test_repeated_runs_produce_identical_output() {
    let server = MockServer::start().await;
    mount_feed(&server, "/feed.xml", RSS).await;
    let validator = validator();
    let feed_url = validator
        .validate(&url(&server, "news.test", "/feed.xml"), UrlLabel::Feed)
        .await
        .unwrap();
    let fetcher = fetcher(&server);

    let mut outputs = Vec::new();
    for _ in 0..2 {
        let bytes = fetcher
            .fetch(&feed_url, &PublicOnlyPolicy::new(&validator))
            .await
            .unwrap();
        outputs.push(render_markdown(&parse_feed(&bytes).unwrap(), &full_config()));
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[tokio::test]
async fn test_rendered_feed_written_to_workspace() {
    let server = MockServer::start().await;
    mount_feed(&server, "/feed.xml", RSS).await;
    let validator = validator();
    let feed_url = validator
        .validate(&url(&server, "news.test", "/feed.xml"), UrlLabel::Feed)
        .await
        .unwrap();
    let bytes = fetcher(&server)
        .fetch(&feed_url, &PublicOnlyPolicy::new(&validator))
        .await
        .unwrap();
    let markdown = render_markdown(&parse_feed(&bytes).unwrap(), &RenderConfig::default());

    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::new(dir.path()).unwrap();
    let target = workspace.validate_output("digests/news.md").unwrap();
    write_atomic(&target, &markdown).unwrap();

    let written = std::fs::read_to_string(workspace.root().join("digests/news.md")).unwrap();
    assert_eq!(written, markdown);
}

// ============================================================================
// SSRF defenses
// ============================================================================

#[tokio::test]
async fn test_redirect_to_metadata_address_is_refused() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "location",
            url(&server, "metadata.test", "/latest/meta-data/").as_str(),
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/latest/meta-data/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("secret"))
        .expect(0)
        .mount(&server)
        .await;

    let validator = validator();
    let feed_url = validator
        .validate(&url(&server, "news.test", "/feed.xml"), UrlLabel::Feed)
        .await
        .unwrap();
    let err = fetcher(&server)
        .fetch(&feed_url, &PublicOnlyPolicy::new(&validator))
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            FetchError::Validation(UrlValidationError::Host {
                label: UrlLabel::Redirect,
                ..
            })
        ),
        "{err:?}"
    );
    assert_eq!(
        err.to_string(),
        "Redirect URL host resolves to a non-public IP address (169.254.169.254 is link-local)"
    );
}

#[tokio::test]
async fn test_feed_url_on_loopback_never_fetched() {
    let validator = validator();
    let err = validator
        .validate("http://127.0.0.1:8080/feed.xml", UrlLabel::Feed)
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("Feed URL host"), "{err}");

    let err = validator
        .validate("http://localhost/feed.xml", UrlLabel::Feed)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Feed URL host uses localhost, which is not allowed");
}

#[tokio::test]
async fn test_malformed_feed_is_parse_error() {
    let server = MockServer::start().await;
    mount_feed(&server, "/feed.xml", "<rss><channel><title>x</channel></rss>").await;
    let validator = validator();
    let feed_url = validator
        .validate(&url(&server, "news.test", "/feed.xml"), UrlLabel::Feed)
        .await
        .unwrap();
    let bytes = fetcher(&server)
        .fetch(&feed_url, &PublicOnlyPolicy::new(&validator))
        .await
        .unwrap();

    assert!(parse_feed(&bytes).is_err());
}
