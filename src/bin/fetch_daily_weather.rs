//! Fetch daily weather for the configured provinces: archival history over a
//! date window plus, optionally, the short-range forecast. Exit code 0 on
//! success, 1 on any non-recoverable error.

use chrono::{NaiveDate, Utc};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use farecast::config::{AppConfig, PROVINCES};
use farecast::csvio::{write_daily_weather_csv, DailyWeatherCsvRow};
use farecast::services::openmeteo::OpenMeteoClient;
use farecast::services::openweather::OpenWeatherClient;
use farecast::services::weather_ingest;

#[derive(Debug, Parser)]
#[command(
    name = "fetch-daily-weather",
    about = "Fetch historical (and optionally forecast) daily weather for all provinces"
)]
struct Args {
    /// Start of the historical window (YYYY-MM-DD).
    #[arg(long)]
    start: NaiveDate,

    /// End of the historical window (YYYY-MM-DD).
    #[arg(long)]
    end: NaiveDate,

    /// Also pull the short-range forecast (requires OPENWEATHERMAP_API_KEY).
    #[arg(long)]
    with_forecast: bool,

    /// Recompute monthly statistics for every (province, period) with daily
    /// rows, not just the ones touched by this run.
    #[arg(long)]
    refresh_stats: bool,

    /// Optional CSV dump of the rows written.
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
        tracing::error!("fetch-daily-weather failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), farecast::AppError> {
    if args.end < args.start {
        return Err(farecast::AppError::Input("end before start".to_string()));
    }

    let config = AppConfig::from_env();
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!().run(&pool).await.map_err(|e| {
        farecast::AppError::Internal(format!("migrations failed: {}", e))
    })?;

    let archive = OpenMeteoClient::new(&config.open_meteo_archive_url);
    let mut outcome = weather_ingest::ingest_historical(
        &pool,
        &archive,
        PROVINCES,
        args.start,
        args.end,
        config.weather_cutover_date,
    )
    .await?;

    if args.with_forecast {
        let Some(api_key) = &config.openweathermap_api_key else {
            return Err(farecast::AppError::Input(
                "OPENWEATHERMAP_API_KEY must be set for --with-forecast".to_string(),
            ));
        };
        let forecast = OpenWeatherClient::new(&config.openweathermap_forecast_url, api_key);
        let today = Utc::now().date_naive();
        let forecast_outcome = weather_ingest::ingest_forecast(
            &pool,
            &forecast,
            PROVINCES,
            today,
            config.weather_cutover_date,
        )
        .await?;
        outcome.rows_written += forecast_outcome.rows_written;
        outcome.rows_skipped += forecast_outcome.rows_skipped;
        outcome.chunks_failed += forecast_outcome.chunks_failed;
        outcome.stats_recomputed += forecast_outcome.stats_recomputed;
        outcome.rows.extend(forecast_outcome.rows);
    }

    if args.refresh_stats {
        let refreshed = weather_ingest::refresh_monthly_stats(&pool).await?;
        outcome.stats_recomputed = outcome.stats_recomputed.max(refreshed);
    }

    if let Some(path) = args.out {
        let file = std::fs::File::create(&path)
            .map_err(|e| farecast::AppError::Input(format!("cannot create {:?}: {}", path, e)))?;
        let rows: Vec<DailyWeatherCsvRow> =
            outcome.rows.iter().map(DailyWeatherCsvRow::from).collect();
        write_daily_weather_csv(file, &rows)?;
        tracing::info!("Wrote {} weather rows to {:?}", rows.len(), path);
    }

    println!(
        "Weather ingestion complete: {} rows written, {} skipped, {} chunk failures, {} stats recomputed",
        outcome.rows_written,
        outcome.rows_skipped,
        outcome.chunks_failed,
        outcome.stats_recomputed,
    );
    Ok(())
}
