//! mediaqa CLI: answer questions about a multimedia article.
//!
//! Fetches the article, describes its images and audio with cached model
//! calls, answers the question feed and submits the report.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
