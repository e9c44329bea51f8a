//! Import holidays from a CSV file (date,name,name_en,category) and refresh
//! the per-month statistics. Exit code 0 on success, 1 on any
//! non-recoverable error.

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use farecast::config::AppConfig;
use farecast::csvio::read_holidays_csv;
use farecast::db::models::HolidayEntry;
use farecast::db::queries;
use farecast::helpers::f64_to_decimal_2dp;
use farecast::services::holiday_ingest::build_month_stats;

#[derive(Debug, Parser)]
#[command(
    name = "import-holidays-from-csv",
    about = "Import holiday rows from CSV and refresh monthly statistics"
)]
struct Args {
    /// Path to the CSV file.
    #[arg(long)]
    file: std::path::PathBuf,
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
        tracing::error!("import-holidays-from-csv failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), farecast::AppError> {
    let file = std::fs::File::open(&args.file)
        .map_err(|e| farecast::AppError::Input(format!("cannot open {:?}: {}", args.file, e)))?;
    let entries: Vec<HolidayEntry> = read_holidays_csv(file)?
        .into_iter()
        .map(HolidayEntry::from)
        .collect();
    tracing::info!("Read {} holiday rows from {:?}", entries.len(), args.file);

    let config = AppConfig::from_env();
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!().run(&pool).await.map_err(|e| {
        farecast::AppError::Internal(format!("migrations failed: {}", e))
    })?;

    let mut written = 0usize;
    for stats in build_month_stats(entries) {
        let detail = serde_json::to_value(&stats.entries).map_err(|e| {
            farecast::AppError::Internal(format!("holiday detail serialization: {}", e))
        })?;
        queries::upsert_holiday_stat(
            &pool,
            &stats.period,
            stats.holidays_count,
            stats.long_weekends_count,
            f64_to_decimal_2dp(stats.holiday_score),
            &detail,
        )
        .await?;
        written += 1;

        // Read back for the operator's log
        if let Some(stat) = queries::holiday_stat(&pool, &stats.period).await? {
            tracing::info!(
                "{}: {} holidays, {} long weekends, score {}",
                stat.period,
                stat.holidays_count,
                stat.long_weekends_count,
                stat.holiday_score,
            );
        }
    }

    println!("Imported holiday statistics for {} period(s)", written);
    Ok(())
}
