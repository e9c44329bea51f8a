pub mod analysis;
pub mod forecasting;
pub mod gbm;
pub mod geo;
pub mod holiday_api;
pub mod holiday_ingest;
pub(crate) mod http;
pub mod openmeteo;
pub mod openweather;
pub mod scores;
pub mod seasons;
pub mod weather_ingest;
