use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};

use crate::engine::{ChangePolicy, DEFAULT_CONCURRENCY, SyncConfig, SyncEngine};
use crate::networking::{
    BlockingFetcher, BlockingNetworkClient, DEFAULT_USER_AGENT, Fetcher, NetworkClient,
    RetryPolicy,
};
use crate::util::format_names;

mod catalog;
mod engine;
mod env;
mod error;
mod networking;
mod storage;
mod util;

#[derive(Parser, Debug)]
#[command(
    name = "logo-sync",
    author,
    version,
    about = "Download vehicle manufacturer logos and keep a manifest of them up to date"
)]
struct Cli {
    /// Target directory for the download.
    #[arg(long, default_value = env::DEFAULT_TARGET_DIR)]
    target_dir: PathBuf,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,

    /// Catalog site to scrape.
    #[arg(long, default_value = catalog::DEFAULT_BASE_URL)]
    base_url: String,

    /// Attempts per request before giving up.
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Base delay in seconds; doubled after each failed attempt.
    #[arg(long, default_value_t = 1.0, value_parser = parse_backoff_factor)]
    backoff_factor: f64,

    /// Maximum number of manufacturers processed at once.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// What to do when a local logo differs from the upstream one.
    #[arg(long, value_enum, default_value_t = ChangePolicy::Skip)]
    on_change: ChangePolicy,

    /// User-Agent header sent with every request.
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    user_agent: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let retry = RetryPolicy {
        retries: cli.retries,
        backoff_factor: cli.backoff_factor,
        ..RetryPolicy::default()
    };
    let config = SyncConfig {
        base_url: cli.base_url,
        target_dir: cli.target_dir,
        concurrency: cli.concurrency,
        change_policy: cli.on_change,
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    // The blocking client owns its own runtime, so it is built here rather
    // than inside `block_on`.
    let catalog = BlockingFetcher::new(BlockingNetworkClient::new(&cli.user_agent), retry.clone());
    let fetcher = Fetcher::new(NetworkClient::new(&cli.user_agent), retry);
    let engine = SyncEngine::new(config, fetcher, catalog);

    match runtime.block_on(engine.run()) {
        Ok(report) => {
            info!(
                "sync complete: {} discovered, {} downloaded, {} unchanged, {} changed upstream, {} without logo, {} failed",
                report.discovered,
                report.downloaded.len(),
                report.unchanged.len(),
                report.changed_skipped.len(),
                report.not_found.len(),
                report.failures.len()
            );
            if !report.failures.is_empty() {
                let failed = report
                    .failures
                    .iter()
                    .map(|failure| format!("{} ({})", failure.name, failure.error))
                    .collect::<Vec<_>>();
                warn!("failed manufacturers: {}", format_names(&failed));
            }
            if !report.manifest_written {
                info!("manifest left unchanged");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("sync failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn parse_backoff_factor(value: &str) -> Result<f64, String> {
    let factor: f64 = value
        .parse()
        .map_err(|err| format!("`{value}` is not a number: {err}"))?;
    if factor.is_finite() && factor >= 0.0 {
        Ok(factor)
    } else {
        Err(format!("`{value}` must be a finite number of seconds >= 0"))
    }
}

/// `RUST_LOG` wins when set; otherwise `--debug` turns on this crate's debug
/// output while dependencies stay at `info`.
fn init_logging(debug: bool) {
    let default_filter = if debug {
        concat!(env!("CARGO_CRATE_NAME"), "=debug,info")
    } else {
        "info"
    };
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or(default_filter));
    if let Err(err) = builder.try_init() {
        eprintln!("logging already initialised: {err}");
    }
}
