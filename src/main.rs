//! main.rs - Resolve sellers and profitability for one saved product snapshot
//!
//! The snapshot's `productId` drives the live seller lookup; the finished
//! record is printed to stdout as JSON.

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use log::{info, warn};
use seller_profit_core::{
    AggregationService, AggregationState, FeeSchedule, InMemorySettings, InMemorySnapshots, ProductSnapshot,
    ResolverConfig, ResolverOverrides, Season, SellerResolver, NAME, VERSION,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "seller-profit-core")]
#[command(about = "Resolve competing sellers and profitability for a product snapshot")]
struct Cli {
    /// Product snapshot JSON
    snapshot: PathBuf,

    /// Fee schedule JSON; the published schedule is used when omitted
    fee_schedule: Option<PathBuf>,

    #[command(flatten)]
    resolver: ResolverOverrides,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    info!("Starting {} v{}", NAME, VERSION);

    let raw = std::fs::read_to_string(&cli.snapshot)
        .with_context(|| format!("reading snapshot {}", cli.snapshot.display()))?;
    let snapshot: ProductSnapshot = serde_json::from_str(&raw)
        .with_context(|| format!("parsing snapshot {}", cli.snapshot.display()))?;

    let schedule = match &cli.fee_schedule {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading fee schedule {}", path.display()))?;
            FeeSchedule::from_json_str(&raw).with_context(|| format!("parsing fee schedule {}", path.display()))?
        }
        None => {
            let season = Season::for_date(Utc::now().date_naive());
            info!("Using published fee schedule, {:?} storage season", season);
            FeeSchedule { storage_season: season, ..FeeSchedule::default() }
        }
    };

    let config = ResolverConfig::default().with_overrides(&cli.resolver);
    info!("Offers endpoint: {}", config.endpoint);
    let resolver = Arc::new(SellerResolver::with_http(config).context("building offers client")?);

    let product_id = snapshot.product_id.clone();
    let snapshots = Arc::new(InMemorySnapshots::new());
    snapshots.insert(snapshot).await;
    let settings = Arc::new(InMemorySettings::new(schedule));
    let service = AggregationService::new(snapshots, settings, resolver);

    service.load(&product_id, None).await;

    let record = match service.state().await {
        AggregationState::Ready(record) => record,
        AggregationState::Error { record, reason } => {
            warn!("Degraded record for {}: {}", product_id, reason);
            record
        }
        other => bail!("resolution did not finish: {:?}", other),
    };

    println!("{}", serde_json::to_string_pretty(record.as_ref())?);
    Ok(())
}
