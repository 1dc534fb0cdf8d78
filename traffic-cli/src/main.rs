//! Binary crate for the `traffic` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Interactive configuration
//! - Printing predictions and analytics

use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();

    // stdout carries the JSON output, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_max_level(cmd.log_level)
        .with_writer(std::io::stderr)
        .init();

    cmd.run().await
}
