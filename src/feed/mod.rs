//! Feed retrieval and parsing.
//!
//! - **Fetching**: a single HTTP GET whose redirect hops are each checked by a
//!   [`RedirectPolicy`] before they are requested
//! - **Parsing**: RSS 2.0 and Atom documents normalized into one [`FeedDocument`] shape
//!
//! # Architecture
//!
//! - [`fetcher`] - HTTP fetching with redirect interception, timeout and size limits
//! - [`parser`] - Namespace-aware XML parsing with `quick-xml`
//!
//! # Example
//!
//! ```ignore
//! use feed2md::feed::{parse_feed, FeedFetcher, PublicOnlyPolicy};
//! use feed2md::util::{SystemResolver, UrlLabel, UrlValidator};
//!
//! let validator = UrlValidator::new(SystemResolver);
//! let url = validator.validate("https://example.com/feed.xml", UrlLabel::Feed).await?;
//! let bytes = FeedFetcher::new()?.fetch(&url, &PublicOnlyPolicy::new(&validator)).await?;
//! let document = parse_feed(&bytes)?;
//! ```

pub mod fetcher;
pub mod parser;

pub use fetcher::{client_builder, FeedFetcher, FetchError, PublicOnlyPolicy, RedirectPolicy};
pub use parser::{parse_feed, FeedDocument, FeedEntry, FeedFormat, ParseError};
