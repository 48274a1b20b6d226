//! Command-line surface.
//!
//! The interface is deliberately thin: a run is fully described by its
//! configuration file, the flags only locate it and tune diagnostics.

use std::path::PathBuf;

use clap::Parser;

use crate::config::Settings;
use crate::pipeline;

#[derive(Debug, Parser)]
#[command(name = "docscan", about = "Document harvesting and file-format forensics")]
pub struct Cli {
    /// Run configuration (TOML).
    #[arg(long, short)]
    pub config: PathBuf,

    /// Print the effective settings before starting.
    #[arg(long)]
    pub dump_config: bool,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;
    if cli.dump_config {
        println!("{:#?}", settings);
    }
    pipeline::run(settings).await
}
