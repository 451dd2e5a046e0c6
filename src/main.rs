use aggregation::{AggregationQuery, AggregationService};
use analytics::{MidpointElasticityCalculator, MidpointResult};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use configuration::{ConfigArgs, Settings, init_tracing};
use core_types::{Calculation, CalculationRequest, MarketSnapshot, parse_timestamp};
use database::{
    CalculationStore, MemoryRepository, ObservationSource, PgRepository, SnapshotSource, connect, run_migrations,
};
use executor::{CalculationExecutor, ExecutionOutcome};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use worker::{DispatchMode, Dispatched, Dispatcher, Poller, TaskReport};

/// The main entry point for the elasticity engine.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine: DATABASE_URL may come from the environment.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = cli.config.load().context("Failed to load configuration")?;
    let _log_guard = init_tracing(&settings.logging)?;

    match cli.command {
        Commands::Migrate => handle_migrate().await,
        Commands::Calculate(args) => handle_calculate(args, &settings).await,
        Commands::Status(args) => handle_status(args).await,
        Commands::Aggregate(args) => handle_aggregate(args).await,
        Commands::Worker(args) => handle_worker(args, settings).await,
        Commands::Simulate(args) => handle_simulate(args, &settings),
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Price elasticity of demand for the USDT/BOB P2P market.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations.
    Migrate,
    /// Create an elasticity calculation and run it.
    Calculate(CalculateArgs),
    /// Show a stored calculation.
    Status(StatusArgs),
    /// Bucket market snapshots into an hourly, daily or weekly series.
    Aggregate(AggregateArgs),
    /// Run the background worker pool, picking up pending calculations.
    Worker(WorkerArgs),
    /// Arc elasticity for a hypothetical price/quantity move. Nothing is stored.
    Simulate(SimulateArgs),
}

#[derive(Parser)]
struct CalculateArgs {
    /// `midpoint` or `regression`.
    #[arg(long, default_value = "midpoint")]
    method: String,

    /// Start of the period (YYYY-MM-DD or RFC 3339).
    #[arg(long)]
    from: String,

    /// End of the period (YYYY-MM-DD or RFC 3339).
    #[arg(long)]
    to: String,

    /// `hourly`, `daily` or `weekly`.
    #[arg(long, default_value = "daily")]
    window: String,

    /// Queue the calculation on the worker pool instead of running it inline.
    #[arg(long = "async")]
    run_async: bool,

    /// Use an in-memory store seeded with synthetic snapshots instead of PostgreSQL.
    #[arg(long)]
    memory_demo: bool,
}

#[derive(Parser)]
struct StatusArgs {
    /// The calculation id.
    id: Uuid,
}

#[derive(Parser)]
struct AggregateArgs {
    /// `24h`, `7d`, `30d` or `90d`. Ignored when --from/--to are given.
    #[arg(long)]
    range: Option<String>,

    #[arg(long, requires = "to")]
    from: Option<String>,

    #[arg(long, requires = "from")]
    to: Option<String>,

    /// `hourly`, `daily` or `weekly`.
    #[arg(long, default_value = "daily")]
    granularity: String,

    /// `primary` (ohlc), `secondary` (p2p) or `all`.
    #[arg(long, default_value = "all")]
    source: String,
}

#[derive(Parser)]
struct WorkerArgs {
    /// Seconds between polls for pending calculations. Overrides `worker.poll_interval_secs`.
    #[arg(long)]
    poll_secs: Option<u64>,
}

#[derive(Parser)]
struct SimulateArgs {
    #[arg(long)]
    price_initial: Decimal,

    #[arg(long)]
    price_final: Decimal,

    #[arg(long)]
    quantity_initial: Decimal,

    #[arg(long)]
    quantity_final: Decimal,
}

// ==============================================================================
// Storage Wiring
// ==============================================================================

/// The trait objects every service is built from.
struct Storage {
    observations: Arc<dyn ObservationSource>,
    snapshots: Arc<dyn SnapshotSource>,
    store: Arc<dyn CalculationStore>,
}

impl Storage {
    fn from_repository<R>(repo: Arc<R>) -> Self
    where
        R: ObservationSource + SnapshotSource + CalculationStore + 'static,
    {
        Self {
            observations: repo.clone(),
            snapshots: repo.clone(),
            store: repo,
        }
    }

    async fn postgres() -> anyhow::Result<Self> {
        let pool = connect().await.context("Failed to connect to the database")?;
        Ok(Self::from_repository(Arc::new(PgRepository::new(pool))))
    }

    fn memory_demo(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::from_repository(Arc::new(MemoryRepository::with_snapshots(demo_snapshots(start, end))))
    }
}

/// One primary-tier snapshot per day: the price drifts up while offers thin out.
fn demo_snapshots(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<MarketSnapshot> {
    let days = (end - start).num_days().max(0);
    (0..=days)
        .map(|i| {
            let step = Decimal::from(i);
            let price = dec!(9.80) + step * dec!(0.01);
            MarketSnapshot {
                timestamp: start + Duration::days(i),
                average_sell_price: price,
                average_buy_price: Some(price - dec!(0.03)),
                total_volume: Some(dec!(60000) - step * dec!(400)),
                spread_percentage: Some(dec!(0.31)),
                num_active_traders: 0,
                data_quality_score: 0.95,
            }
        })
        .collect()
}

// ==============================================================================
// Command Handlers
// ==============================================================================

async fn handle_migrate() -> anyhow::Result<()> {
    let pool = connect().await.context("Failed to connect to the database")?;
    run_migrations(&pool).await.context("Failed to run database migrations")?;
    println!("Migrations applied.");
    Ok(())
}

async fn handle_calculate(args: CalculateArgs, settings: &Settings) -> anyhow::Result<()> {
    let request = CalculationRequest::parse(&args.method, &args.from, &args.to, &args.window)?;
    let calculation = request.clone().into_calculation(Utc::now(), &settings.requests)?;
    let id = calculation.id;

    let storage = if args.memory_demo {
        Storage::memory_demo(request.start_date, request.end_date)
    } else {
        Storage::postgres().await?
    };
    storage.store.insert(&calculation).await?;
    info!(calculation_id = %id, method = %calculation.method, "Calculation created");

    let executor = CalculationExecutor::new(storage.observations.clone(), storage.store.clone(), settings);
    let mode = if args.run_async || settings.worker.async_enabled {
        DispatchMode::Async
    } else {
        DispatchMode::Sync
    };
    let dispatcher = match mode {
        DispatchMode::Async => Dispatcher::start(executor, &settings.worker),
        DispatchMode::Sync => Dispatcher::inline(executor, &settings.worker),
    };

    let report = match dispatcher.dispatch(id, mode).await? {
        Dispatched::Inline(report) => report,
        Dispatched::Queued(handle) => {
            println!("Calculation {} queued, waiting for the worker pool...", id);
            handle.wait().await?
        }
    };
    dispatcher.shutdown().await;

    print_report(&report);
    let stored = storage
        .store
        .load(id)
        .await?
        .with_context(|| format!("Calculation {} disappeared from the store", id))?;
    println!("{}", calculation_table(&stored));
    Ok(())
}

async fn handle_status(args: StatusArgs) -> anyhow::Result<()> {
    let storage = Storage::postgres().await?;
    match storage.store.load(args.id).await? {
        Some(calculation) => println!("{}", calculation_table(&calculation)),
        None => anyhow::bail!("Calculation {} not found", args.id),
    }
    Ok(())
}

async fn handle_aggregate(args: AggregateArgs) -> anyhow::Result<()> {
    let bounds = match (&args.from, &args.to) {
        (Some(from), Some(to)) => Some((parse_timestamp("from", from)?, parse_timestamp("to", to)?)),
        _ => None,
    };
    let query = AggregationQuery::parse(args.range.as_deref(), bounds, &args.granularity, &args.source)?;

    let storage = Storage::postgres().await?;
    let result = AggregationService::new(storage.snapshots).aggregate(&query).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn handle_worker(args: WorkerArgs, mut settings: Settings) -> anyhow::Result<()> {
    if let Some(secs) = args.poll_secs {
        settings.worker.poll_interval_secs = secs.max(1);
    }

    let storage = Storage::postgres().await?;
    let executor = CalculationExecutor::new(storage.observations, storage.store.clone(), &settings);
    let dispatcher = Arc::new(Dispatcher::start(executor, &settings.worker));
    let poller = Poller::new(storage.store, dispatcher.clone(), &settings.worker);

    poller
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    drop(poller);

    if let Ok(dispatcher) = Arc::try_unwrap(dispatcher) {
        dispatcher.shutdown().await;
    }
    Ok(())
}

fn handle_simulate(args: SimulateArgs, settings: &Settings) -> anyhow::Result<()> {
    let calculator = MidpointElasticityCalculator::new(settings.midpoint.clone(), settings.classification.clone());
    let result = calculator.calculate(
        args.quantity_initial,
        args.quantity_final,
        args.price_initial,
        args.price_final,
    )?;
    println!("{}", simulation_table(&result));
    Ok(())
}

// ==============================================================================
// Output
// ==============================================================================

fn print_report(report: &TaskReport) {
    match &report.outcome {
        ExecutionOutcome::Completed {
            elasticity,
            classification,
        } => println!(
            "Calculation {} completed after {} attempt(s): {} ({})",
            report.calculation_id, report.attempts, elasticity, classification
        ),
        ExecutionOutcome::Failed { error } => println!(
            "Calculation {} failed after {} attempt(s): {}",
            report.calculation_id, report.attempts, error
        ),
        other => println!("Calculation {}: {}", report.calculation_id, other.label()),
    }
}

fn calculation_table(calculation: &Calculation) -> Table {
    fn or_dash<T: ToString>(value: Option<T>) -> String {
        value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
    }

    let interval = match (calculation.confidence_interval_lower, calculation.confidence_interval_upper) {
        (Some(lower), Some(upper)) => format!("[{}, {}]", lower, upper),
        _ => "-".to_string(),
    };

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Field", "Value"]);

    let rows = [
        ("ID", calculation.id.to_string()),
        ("Method", calculation.method.to_string()),
        ("Window", calculation.window_size.to_string()),
        ("Period", format!("{} to {}", calculation.start_date, calculation.end_date)),
        ("Status", calculation.status.to_string()),
        ("Elasticity", or_dash(calculation.elasticity_coefficient)),
        ("Classification", or_dash(calculation.classification)),
        ("Confidence interval", interval),
        ("R squared", or_dash(calculation.r_squared)),
        ("Standard error", or_dash(calculation.standard_error)),
        ("Data points", calculation.data_points_used.to_string()),
        ("Average data quality", format!("{:.3}", calculation.average_data_quality)),
        ("Reliable", calculation.is_reliable.to_string()),
        ("Reliability note", or_dash(calculation.reliability_note.as_ref())),
        ("Error", or_dash(calculation.error_message.as_ref())),
        ("Completed at", or_dash(calculation.completed_at)),
    ];
    for (field, value) in rows {
        table.add_row(vec![field.to_string(), value]);
    }
    table
}

fn simulation_table(result: &MidpointResult) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Field", "Value"]);

    let rows = [
        ("Elasticity", result.elasticity.round_dp(4).to_string()),
        ("Classification", result.classification.to_string()),
        ("Price change %", result.percentage_change_price.round_dp(2).to_string()),
        ("Quantity change %", result.percentage_change_quantity.round_dp(2).to_string()),
        ("Reliable", result.is_reliable.to_string()),
        ("Reliability note", result.reliability_note.clone().unwrap_or_else(|| "-".to_string())),
    ];
    for (field, value) in rows {
        table.add_row(vec![field.to_string(), value]);
    }
    table
}
