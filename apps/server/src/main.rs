//! Pagewright: a webhook service that drafts and edits Notion pages with an LLM.
//!
//! Notion automations post the triggering page to the listener; the page is
//! completed from its own content, its feedback comments, and related pages
//! found through a vector index over the configured databases.

mod commands;
mod server;

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
