//! Import daily weather rows from a CSV file
//! (province,date,temp_max,temp_min,precipitation_mm,humidity,source) and
//! recompute the touched monthly statistics. Exit code 0 on success, 1 on
//! any non-recoverable error.

use std::collections::BTreeSet;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use farecast::calendar::period_of;
use farecast::config::AppConfig;
use farecast::csvio::read_daily_weather_csv;
use farecast::db::queries;
use farecast::services::weather_ingest::recompute_monthly_stat;

#[derive(Debug, Parser)]
#[command(
    name = "import-daily-weather-from-csv",
    about = "Import daily weather rows from CSV and recompute monthly statistics"
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
        tracing::error!("import-daily-weather-from-csv failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), farecast::AppError> {
    let file = std::fs::File::open(&args.file)
        .map_err(|e| farecast::AppError::Input(format!("cannot open {:?}: {}", args.file, e)))?;
    let rows = read_daily_weather_csv(file)?;
    tracing::info!("Read {} weather rows from {:?}", rows.len(), args.file);

    let config = AppConfig::from_env();
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!().run(&pool).await.map_err(|e| {
        farecast::AppError::Internal(format!("migrations failed: {}", e))
    })?;

    let mut written = 0usize;
    let mut skipped = 0usize;
    let mut touched: BTreeSet<(String, String)> = BTreeSet::new();
    for row in &rows {
        let params = row.to_upsert_params();
        if queries::upsert_daily_weather(&pool, &params).await? {
            written += 1;
            touched.insert((params.province.clone(), period_of(params.date)));
        } else {
            skipped += 1;
        }
    }

    let mut recomputed = 0usize;
    for (province, period) in &touched {
        if recompute_monthly_stat(&pool, province, period).await? {
            recomputed += 1;
            // Read back for the operator's log
            if let Some(stat) = queries::monthly_weather_stat(&pool, province, period).await? {
                tracing::info!(
                    "{} {}: avg {}°C, rain {} mm, score {}",
                    stat.province,
                    stat.period,
                    stat.avg_temp,
                    stat.avg_rain,
                    stat.weather_score,
                );
            }
        }
    }

    println!(
        "Imported {} weather row(s) ({} skipped), recomputed {} monthly stat(s)",
        written, skipped, recomputed,
    );
    Ok(())
}
