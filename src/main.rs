use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

mod config;
mod downloader;
mod metadata;
mod prober;
mod utils;

use config::{Config, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS};
use utils::Checksum;

/// Generates a direct download link for a shared Google Drive file.
#[derive(Parser)]
#[clap(name = "drive-link", version)]
struct Args {
    #[clap(help = "Drive file id")]
    id: String,
    #[clap(short, long, help = "Download the file after generating the link")]
    auto: bool,
    #[clap(short, long, help = "Print debug output")]
    verbose: bool,
    #[clap(short, long, help = "Output path (skips the filename lookup)")]
    output: Option<PathBuf>,
    #[clap(
        short = 'd',
        long,
        default_value = ".",
        help = "Directory for downloads named from metadata"
    )]
    dir: PathBuf,
    #[clap(
        long,
        env = "DRIVE_LINK_API_KEY",
        hide_env_values = true,
        help = "API key for the metadata endpoint"
    )]
    api_key: Option<String>,
    #[clap(long, help = "Expected md5, sha1 or sha256 of the file (hex)")]
    checksum: Option<String>,
    #[clap(
        long,
        env = "DRIVE_LINK_CONNECT_TIMEOUT",
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        help = "Connect timeout in seconds"
    )]
    connect_timeout: u64,
    #[clap(
        long,
        env = "DRIVE_LINK_READ_TIMEOUT",
        default_value_t = DEFAULT_READ_TIMEOUT_SECS,
        help = "Read timeout in seconds"
    )]
    read_timeout: u64,
}

impl Args {
    fn into_config(self) -> Result<Config> {
        let mut config = Config::new(&self.id)?;
        config.auto = self.auto;
        config.output = self.output;
        config.output_dir = self.dir;
        config.api_key = self.api_key.filter(|key| !key.is_empty());
        config.checksum = self.checksum.as_deref().map(Checksum::parse).transpose()?;
        config.connect_timeout = Duration::from_secs(self.connect_timeout);
        config.read_timeout = Duration::from_secs(self.read_timeout);
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::builder()
        .filter_level(log_level)
        .parse_default_env()
        .init();

    let config = match args.into_config() {
        Ok(config) => config,
        Err(err) => {
            log::error!("Error: {:#}", err);
            process::exit(1);
        }
    };

    match downloader::run(&config).await {
        Ok(outcome) => {
            if let Some(saved) = outcome.saved {
                log::info!("Saved {} ({} bytes)", saved.path.display(), saved.bytes);
            }
        }
        Err(err) => {
            log::error!("Error: {:#}", err);
            process::exit(1);
        }
    }

    Ok(())
}
