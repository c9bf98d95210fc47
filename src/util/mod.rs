//! Validation and text helpers shared by the fetch and render stages.
//!
//! This module provides reusable utilities for:
//!
//! - **Host classification**: DNS resolution with per-address public/non-public categories
//! - **URL validation**: Security-focused validation to prevent SSRF attacks
//! - **Path validation**: Keeping output files inside the workspace
//! - **Text processing**: Plain-text normalization and summary truncation
//!
//! # Examples
//!
//! ```
//! use feed2md::util::{normalize_text, truncate_summary};
//!
//! let text = normalize_text("<p>Release   notes &amp; fixes</p>");
//! assert_eq!(text, "Release notes & fixes");
//!
//! assert_eq!(truncate_summary(&text, 8), "Release…");
//! ```

mod host;
mod path_validator;
mod text;
mod url_validator;

pub use host::{
    categorize, ClassifiedAddr, HostCategory, HostClassifier, HostError, ResolutionError, Resolve,
    SystemResolver,
};
pub use path_validator::{PathValidationError, ValidatedOutputPath, Workspace};
pub use text::{normalize_text, truncate_summary};
pub use url_validator::{UrlLabel, UrlValidationError, UrlValidator, ValidatedUrl};
