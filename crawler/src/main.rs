//! Crawl the Yggdrasil network through the local admin socket and print the
//! report to stdout.

use clap::Parser;
use log::LevelFilter;
use std::time::Duration;
use yggdrasil_crawler::{AdminClient, AdminConfiguration, AdminProbe, CrawlerBuilder, PublicKey};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path of the daemon's admin socket.
    #[arg(short, long, default_value = yggdrasil_admin::DEFAULT_SOCKET_PATH)]
    socket: String,

    /// Key to start from instead of the local node (hex).
    #[arg(long)]
    seed: Option<String>,

    /// Maximum number of nodes probed at once.
    #[arg(short, long, default_value = "32")]
    concurrent_probes: usize,

    /// Attempts per query before giving up on a node.
    #[arg(short, long, default_value = "3")]
    max_attempts: usize,

    /// Seconds to wait for the admin socket to accept.
    #[arg(long, default_value = "1")]
    dial_timeout: u64,

    /// Seconds to wait for an admin response.
    #[arg(long, default_value = "60")]
    response_timeout: u64,

    /// Seconds between progress lines in the log.
    #[arg(long, default_value = "60")]
    status_interval: u64,

    /// Log level.
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    // Stdout carries the report, logs go to stderr.
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] {} - {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log_level)
        .chain(std::io::stderr())
        .apply()?;

    let config = AdminConfiguration::default()
        .with_socket_path(args.socket)
        .with_max_attempts(args.max_attempts)
        .with_dial_timeout(Duration::from_secs(args.dial_timeout))
        .with_response_timeout(Duration::from_secs(args.response_timeout));
    log::debug!("Admin configuration: {config:?}");
    let client = AdminClient::unix(config);

    let seed = match args.seed {
        Some(seed) => seed
            .parse::<PublicKey>()
            .map_err(|e| format!("Invalid seed key {seed}: {e}"))?,
        None => client.get_self().await.map_err(|e| {
            log::error!("Cannot resolve the local node: {e}");
            e
        })?,
    };

    log::debug!("Using {} concurrent probes", args.concurrent_probes);
    let crawler = CrawlerBuilder::new(AdminProbe::new(client))
        .with_max_concurrent_probes(args.concurrent_probes)
        .with_status_interval(Duration::from_secs(args.status_interval))
        .build();

    let (summary, _) = crawler
        .crawl_into(seed, std::io::stdout())
        .await
        .map_err(|e| format!("Crawl failed: {e}"))?;

    log::info!(
        "Wrote {} nodes ({} abandoned probes)",
        summary.recorded,
        summary.abandoned
    );
    Ok(())
}
