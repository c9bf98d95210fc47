//! Command-line arguments and the validated run configuration derived from them.
//!
//! Numeric flags are accepted as signed integers so that a negative value
//! reaches [`RunConfig::from_args`] and fails with a message naming the flag,
//! rather than surfacing as a generic parse error.
use clap::{Parser, ValueEnum};
use thiserror::Error;

/// Default for `--summary-max-length`.
pub const DEFAULT_SUMMARY_MAX_LENGTH: i64 = 280;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("--limit must be >= 0")]
    NegativeLimit,

    #[error("--summary-max-length must be >= 0")]
    NegativeSummaryLength,
}

// ============================================================================
// Arguments
// ============================================================================

/// Output layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Template {
    /// One list line per entry.
    #[default]
    Short,
    /// A section per entry, with the publication date and summary.
    Full,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "feed2md",
    version,
    about = "Fetch an RSS or Atom feed and render it as Markdown"
)]
pub struct Args {
    /// Feed URL (http or https)
    pub url: String,

    /// Write Markdown to this path (relative, inside the current directory, ending in .md)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<String>,

    /// Maximum number of entries to render (0 = all)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub limit: i64,

    /// Omit summaries even with the full template
    #[arg(long)]
    pub no_summary: bool,

    /// Truncate summaries to this many characters (0 = no limit)
    #[arg(
        long,
        default_value_t = DEFAULT_SUMMARY_MAX_LENGTH,
        allow_negative_numbers = true
    )]
    pub summary_max_length: i64,

    #[arg(long, value_enum, default_value_t = Template::Short)]
    pub template: Template,
}

// ============================================================================
// Validated configuration
// ============================================================================

/// Rendering options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderConfig {
    pub template: Template,
    /// Only ever true with [`Template::Full`].
    pub include_summary: bool,
    /// 0 disables truncation.
    pub summary_max_length: usize,
    /// 0 renders every entry.
    pub limit: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            template: Template::Short,
            include_summary: false,
            summary_max_length: DEFAULT_SUMMARY_MAX_LENGTH as usize,
            limit: 0,
        }
    }
}

/// Everything a run needs, with numeric flags checked.
///
/// The URL and output path are still raw here; they are validated against
/// the network and the workspace by their own validators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub url: String,
    pub output: Option<String>,
    pub render: RenderConfig,
}

impl RunConfig {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let limit = non_negative(args.limit, ConfigError::NegativeLimit)?;
        let summary_max_length =
            non_negative(args.summary_max_length, ConfigError::NegativeSummaryLength)?;

        let render = RenderConfig {
            template: args.template,
            include_summary: !args.no_summary && args.template == Template::Full,
            summary_max_length,
            limit,
        };
        tracing::debug!(?render, "Render configuration");

        Ok(Self {
            url: args.url,
            output: args.output,
            render,
        })
    }
}

/// Values past `usize::MAX` (32-bit targets) saturate; both flags treat
/// anything that large as unbounded in practice.
fn non_negative(value: i64, negative: ConfigError) -> Result<usize, ConfigError> {
    if value < 0 {
        return Err(negative);
    }
    Ok(usize::try_from(value).unwrap_or(usize::MAX))
}
