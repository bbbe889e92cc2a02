use std::{error::Error, path::PathBuf};

use bts_ingest::{config::DEFAULT_CONFIG_PATH, ingest};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

/// Download the configured monthly BTS archives and keep the csv file inside.
/// Failures of individual months only show up in the log file.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let _ = dotenvy::dotenv();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    ingest::run(&args.config)?;
    Ok(())
}
