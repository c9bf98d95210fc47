//! Fetch an RSS or Atom feed and render it as Markdown.
//!
//! Every URL the tool touches, including each redirect hop and the final
//! response URL, must resolve exclusively to public addresses. Output files
//! are confined to the working directory.
//!
//! The pipeline is:
//!
//! 1. [`util::UrlValidator`] checks the feed URL.
//! 2. [`feed::FeedFetcher`] downloads it, vetting redirects through a
//!    [`feed::RedirectPolicy`].
//! 3. [`feed::parse_feed`] turns the bytes into a [`feed::FeedDocument`].
//! 4. [`render::render_markdown`] produces the Markdown.
//! 5. [`output`] writes it to stdout or a file checked by [`util::Workspace`].

pub mod config;
pub mod feed;
pub mod output;
pub mod render;
pub mod util;
