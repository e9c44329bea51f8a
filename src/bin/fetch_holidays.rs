//! Fetch the Thai holiday calendar for a year range and upsert per-month
//! statistics. Exit code 0 on success, 1 on any non-recoverable error.

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use farecast::config::AppConfig;
use farecast::csvio::{write_holidays_csv, HolidayCsvRow};
use farecast::services::holiday_api::HolidayClient;
use farecast::services::holiday_ingest;

#[derive(Debug, Parser)]
#[command(name = "fetch-holidays", about = "Fetch Thai holidays and refresh monthly statistics")]
struct Args {
    /// First calendar year to fetch.
    #[arg(long)]
    from_year: i32,

    /// Last calendar year to fetch (defaults to from-year).
    #[arg(long)]
    to_year: Option<i32>,

    /// Optional CSV dump of the fetched holiday entries.
    #[arg(long)]
    out: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "farecast=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        tracing::error!("fetch-holidays failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), farecast::AppError> {
    let config = AppConfig::from_env();
    if config.iapp_api_key.is_empty() {
        return Err(farecast::AppError::Input(
            "IAPP_API_KEY must be set to fetch holidays".to_string(),
        ));
    }

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!().run(&pool).await.map_err(|e| {
        farecast::AppError::Internal(format!("migrations failed: {}", e))
    })?;

    let to_year = args.to_year.unwrap_or(args.from_year);
    if to_year < args.from_year {
        return Err(farecast::AppError::Input("to-year before from-year".to_string()));
    }
    let years: Vec<i32> = (args.from_year..=to_year).collect();

    let client = HolidayClient::new(&config.iapp_api_url, &config.iapp_api_key);
    let outcome = holiday_ingest::ingest_years(&pool, &client, &years).await?;

    if let Some(path) = args.out {
        let file = std::fs::File::create(&path)
            .map_err(|e| farecast::AppError::Input(format!("cannot create {:?}: {}", path, e)))?;
        let rows: Vec<HolidayCsvRow> =
            outcome.entries.iter().cloned().map(HolidayCsvRow::from).collect();
        write_holidays_csv(file, &rows)?;
        tracing::info!("Wrote {} holiday rows to {:?}", rows.len(), path);
    }

    println!(
        "Fetched {} holidays across {} year(s): {} periods written, {} failed",
        outcome.holidays_seen,
        years.len(),
        outcome.periods_written,
        outcome.periods_failed,
    );
    Ok(())
}
