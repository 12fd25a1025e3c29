//! gitblog: serve blog content mirrored from a git repository.
//!
//! Keeps a local working copy of the content repository fresh and turns it
//! into an immutable, ordered content snapshot for the rendering layer.

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
