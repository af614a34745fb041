//! Strata Soak Driver
//!
//! Runs a deterministic synthetic player workload against the cache facade
//! and reports its health while the background ticker flushes and sweeps.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Strata Soak Driver                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │   Workload   │───▶│ CacheFacade  │───▶│   Backing    │       │
//! │  │   (seeded)   │    │              │    │    Store     │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! │                             ▲                                    │
//! │                      ┌──────────────┐                            │
//! │                      │    Ticker    │                            │
//! │                      └──────────────┘                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use strata::adapters::{InMemoryBackingStore, InMemoryOriginMap, LoggingEventPublisher};
use strata::config::parse_duration;
use strata::domain::ports::BackingStore;
use strata::{CacheFacade, PlayerRecord, SqlParam, StrataConfig, Ticker, UpdateKind};

const CLASSES: [&str; 7] = ["novice", "warrior", "mage", "rogue", "ranger", "cleric", "bard"];

// =============================================================================
// CLI Arguments
// =============================================================================

/// Strata - soak driver for the tiered player cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file (defaults are used when omitted)
    #[arg(long, env = "STRATA_CONFIG")]
    config: Option<PathBuf>,

    /// How long to run the workload
    #[arg(long, env = "SOAK_DURATION", default_value = "30s")]
    duration: String,

    /// Number of distinct players
    #[arg(long, env = "SOAK_PLAYERS", default_value = "5000")]
    players: usize,

    /// Operations issued per workload tick (one tick every 10ms)
    #[arg(long, env = "SOAK_OPS_PER_TICK", default_value = "50")]
    ops_per_tick: usize,

    /// Workload seed
    #[arg(long, env = "SOAK_SEED", default_value = "42")]
    seed: u64,

    /// Interval between health reports
    #[arg(long, env = "REPORT_INTERVAL", default_value = "10s")]
    report_interval: String,

    /// Postgres connection string; the in-memory store is used when omitted
    #[cfg(feature = "postgres")]
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = match &args.config {
        Some(path) => StrataConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => StrataConfig::default(),
    };
    let duration = parse_duration(&args.duration).context("parsing --duration")?;
    let report_interval =
        parse_duration(&args.report_interval).context("parsing --report-interval")?;
    anyhow::ensure!(args.players > 0, "--players must be > 0");

    info!("Starting Strata soak driver v{}", strata::VERSION);
    info!("  Players: {}", args.players);
    info!("  Duration: {:?}", duration);
    info!("  Seed: {}", args.seed);
    info!(
        "  Tiers: hot={} warm={} cold={} ({})",
        config.tiers.hot.capacity,
        config.tiers.warm.capacity,
        config.tiers.cold.capacity,
        config.tiers.eviction_order.name()
    );

    let backing = backing_store(&args).await?;
    let facade = Arc::new(
        CacheFacade::builder(config, backing)
            .origin(Arc::new(InMemoryOriginMap::new()))
            .publisher(Arc::new(LoggingEventPublisher::debug_level()))
            .build()
            .context("invalid cache configuration")?,
    );

    let shutdown = CancellationToken::new();
    let ticker = Ticker::new(facade.clone())
        .with_shutdown(shutdown.clone())
        .spawn();

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut workload_tick = tokio::time::interval(Duration::from_millis(10));
    let mut report_tick = tokio::time::interval(report_interval);
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);

    let mut operations: u64 = 0;
    loop {
        tokio::select! {
            _ = &mut deadline => {
                info!("Soak duration elapsed");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
            _ = report_tick.tick() => {
                report(&facade, operations);
            }
            _ = workload_tick.tick() => {
                for _ in 0..args.ops_per_tick {
                    run_operation(&facade, &mut rng, args.players).await;
                    operations += 1;
                }
            }
        }
    }

    shutdown.cancel();
    ticker.await.context("ticker task panicked")?;

    let snapshot = facade.health_status();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    info!(operations, "Soak driver finished");

    Ok(())
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["sqlx=warn", "tokio_util=info"] {
        if let Ok(directive) = directive.parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Backing Store
// =============================================================================

async fn backing_store(args: &Args) -> anyhow::Result<Arc<dyn BackingStore>> {
    if let Some(store) = postgres_store(args).await? {
        return Ok(store);
    }

    // Every other player exists up front; the rest are created by writes.
    let store = InMemoryBackingStore::new();
    for index in (0..args.players).step_by(2) {
        store.insert(seed_player(index));
    }
    info!(players = store_size(args.players), "Using in-memory backing store");

    Ok(Arc::new(store))
}

#[cfg(feature = "postgres")]
async fn postgres_store(args: &Args) -> anyhow::Result<Option<Arc<dyn BackingStore>>> {
    let Some(url) = &args.database_url else {
        return Ok(None);
    };

    let store = strata::adapters::PgBackingStore::connect(url, 10)
        .await
        .context("connecting to Postgres")?;
    store.ensure_schema().await.context("creating tables")?;
    info!("Using Postgres backing store");

    Ok(Some(Arc::new(store)))
}

#[cfg(not(feature = "postgres"))]
async fn postgres_store(_args: &Args) -> anyhow::Result<Option<Arc<dyn BackingStore>>> {
    Ok(None)
}

fn store_size(players: usize) -> usize {
    players.div_ceil(2)
}

// =============================================================================
// Workload
// =============================================================================

fn player_id(index: usize) -> String {
    format!("p{:06}", index)
}

fn seed_player(index: usize) -> PlayerRecord {
    let mut record = PlayerRecord::new(player_id(index), CLASSES[index % CLASSES.len()]);
    record.level = 1 + (index % 60) as u32;
    record.experience = (index as u64) * 137;
    record.credits = (index as u64 % 1000) * 10;
    record.with_attribute("guild", json!(format!("guild-{}", index % 40)))
}

/// One operation: mostly reads, then writes, raw updates and queries.
async fn run_operation(facade: &CacheFacade, rng: &mut StdRng, players: usize) {
    let index = rng.gen_range(0..players);
    let id = player_id(index);

    match rng.gen_range(0..100) {
        0..=54 => {
            facade.get_user(&id).await;
        }
        55..=64 => {
            facade.get_user_or_fallback(&id);
        }
        65..=79 => {
            let mut record = facade
                .get_user_full(&id)
                .await
                .unwrap_or_else(|| PlayerRecord::new(id.as_str(), CLASSES[index % CLASSES.len()]));
            record.experience += rng.gen_range(1..250);
            record.level = 1 + (record.experience / 5_000) as u32;
            record.energy = rng.gen_range(0..=100);
            record.damage_dealt += rng.gen_range(0..500);
            if let Err(e) = facade.update_user(&id, record) {
                warn!(error = %e, key = %id, "Rejected write");
            }
        }
        80..=94 => {
            let kind = UpdateKind::RAW[rng.gen_range(0..UpdateKind::RAW.len())];
            let fields = update_fields(kind, rng);
            if let Err(e) = facade.enqueue_stat_update(kind, &json!(id), &fields) {
                warn!(error = %e, kind = %kind, "Rejected generated update");
            }
        }
        _ => {
            let params = [SqlParam::from(id.as_str())];
            if let Err(e) = facade
                .query("SELECT * FROM players WHERE id = $1", &params)
                .await
            {
                warn!(error = %e, "Query failed");
            }
        }
    }
}

fn update_fields(kind: UpdateKind, rng: &mut StdRng) -> Map<String, Value> {
    let value = match kind {
        UpdateKind::Player => return Map::new(),
        UpdateKind::Stats => json!({ "energy": rng.gen_range(0..=100) }),
        UpdateKind::Inventory => json!({
            "item_count": rng.gen_range(0..200),
            "rare_items": rng.gen_range(0..20),
            "equipped": rng.gen_range(0..8),
        }),
        UpdateKind::Achievements => json!({
            "unlocked": rng.gen_range(0..120),
            "points": rng.gen_range(0..5_000),
        }),
        UpdateKind::Telemetry => json!({
            "sessions": rng.gen_range(1..500),
            "commands": rng.gen_range(0..20_000),
            "play_seconds": rng.gen_range(0..360_000),
        }),
    };

    match value {
        Value::Object(fields) => fields,
        _ => Map::new(),
    }
}

fn report(facade: &CacheFacade, operations: u64) {
    let health = facade.health_status();
    info!(
        operations,
        hot = health.tier_sizes.hot,
        warm = health.tier_sizes.warm,
        cold = health.tier_sizes.cold,
        hit_ratio = facade.metrics().hit_ratio(),
        pending = health.pending_updates.values().sum::<usize>(),
        flushed = health.write_behind.flushed_records,
        dead_lettered = health.write_behind.dead_lettered,
        "Cache health"
    );
}
