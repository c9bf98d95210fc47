use anyhow::{Context, Result};
use clap::Parser;

use feed2md::config::{Args, RunConfig};
use feed2md::feed::{parse_feed, FeedFetcher, PublicOnlyPolicy};
use feed2md::output;
use feed2md::render::render_markdown;
use feed2md::util::{SystemResolver, UrlLabel, UrlValidator, Workspace};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // stdout carries only Markdown
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // --help and --version go to stdout and succeed
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    if let Err(e) = run(args).await {
        tracing::debug!(error = ?e, "Run failed");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let validator = UrlValidator::new(SystemResolver);
    let feed_url = validator.validate(&args.url, UrlLabel::Feed).await?;

    let output_path = match args.output.as_deref() {
        Some(raw) => {
            let workspace =
                Workspace::current().context("Unable to determine the current directory")?;
            Some(workspace.validate_output(raw)?)
        }
        None => None,
    };

    let config = RunConfig::from_args(args)?;

    let fetcher = FeedFetcher::new()?;
    let bytes = fetcher
        .fetch(&feed_url, &PublicOnlyPolicy::new(&validator))
        .await?;

    let document = parse_feed(&bytes)?;

    let markdown = render_markdown(&document, &config.render);

    match output_path {
        Some(path) => output::write_atomic(&path, &markdown)?,
        None => output::write_stdout(&markdown)?,
    }
    Ok(())
}
