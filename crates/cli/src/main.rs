use anyhow::Context;
use clap::{Parser, Subcommand};
use geoband::{
    AnyLand, AreaPartitioner, BatchReplayer, BoundingBox, Config, Fetcher, GeometryBoundary,
    HttpQueryService, LandBoundary, Period, ReplayProgress, Store,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Directory holding the cache log; in-memory when omitted
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Run configuration, JSON or `.toml`
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Partition a bounding box for one month
    Partition {
        #[arg(long, allow_hyphen_values = true)]
        north: f64,
        #[arg(long, allow_hyphen_values = true)]
        south: f64,
        #[arg(long, allow_hyphen_values = true)]
        east: f64,
        #[arg(long, allow_hyphen_values = true)]
        west: f64,
        #[arg(long)]
        period: Period,
        /// GeoJSON land geometry used to prune sea-only boxes
        #[arg(long)]
        land: Option<PathBuf>,
    },
    /// Fetch the areas settled for one month across a range of months
    Replay {
        #[arg(long)]
        base_period: Period,
        #[arg(long)]
        start: Period,
        #[arg(long)]
        end: Period,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geoband=info,info".into()),
        )
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    let store = if let Some(dir) = &args.data_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join("cache.log");
        info!("Opening cache at {}", path.display());
        Store::builder().path(path).build()?
    } else {
        info!("Opening in-memory cache");
        Store::builder().build()?
    };

    let service = Arc::new(HttpQueryService::new(&config.fetch)?);

    match args.command {
        Command::Partition {
            north,
            south,
            east,
            west,
            period,
            land,
        } => {
            let bbox = BoundingBox::new(north, south, east, west)?;
            match land {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    let land = GeometryBoundary::from_geojson_str(&text)?;
                    info!("Loaded {} land polygons", land.polygon_count());
                    partition(&store, service, config, land, bbox, period).await?;
                }
                None => partition(&store, service, config, AnyLand, bbox, period).await?,
            }
        }
        Command::Replay {
            base_period,
            start,
            end,
        } => {
            let replayer = BatchReplayer::new(store.clone(), service, &config.fetch);
            let mut observer = |progress: &ReplayProgress| {
                tracing::debug!(
                    "Area {}/{}: {:?}",
                    progress.index + 1,
                    progress.total,
                    progress.status
                );
            };
            let reports = replayer
                .replay_months(base_period, start, end, &mut observer)
                .await?;
            for report in &reports {
                info!(
                    "{}: {} areas, {} cached, {} fetched, {} failed, {} events inserted, {} calls",
                    report.period,
                    report.total,
                    report.cached,
                    report.successful,
                    report.failed,
                    report.events_inserted,
                    report.external_calls
                );
            }
        }
    }

    store.close()?;
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config = if path.extension().is_some_and(|ext| ext == "toml") {
        Config::from_toml(&text)?
    } else {
        Config::from_json(&text)?
    };
    config.validate().map_err(anyhow::Error::msg)?;
    Ok(config)
}

async fn partition<L: LandBoundary>(
    store: &Store,
    service: Arc<HttpQueryService>,
    config: Config,
    land: L,
    bbox: BoundingBox,
    period: Period,
) -> anyhow::Result<()> {
    let fetcher = Fetcher::sequential(service, &config.fetch);
    let partitioner = AreaPartitioner::new(config, fetcher, land);

    let mut session = store.session()?;
    let report = partitioner.run(&mut session, bbox, period).await;
    session.close()?;

    info!(
        "{}: {} areas settled ({} events), {} calls, {} cache hits, {} splits, {} pruned",
        report.period,
        report.settled_count(),
        report.total_events(),
        report.external_calls,
        report.cache_hits,
        report.splits,
        report.pruned
    );
    if report.error_count() > 0 {
        warn!("{} errors recorded in the error log", report.error_count());
    }
    Ok(())
}
