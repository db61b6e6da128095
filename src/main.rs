//! Trisync CLI: reconcile a local folder with a remote folder.

use anyhow::Result;
use clap::Parser;
use std::time::Instant;
use trisync::engine::arg_parser::Cli;
use trisync::engine::handle_run;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
