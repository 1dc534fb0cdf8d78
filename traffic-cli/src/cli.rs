use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use traffic_core::{
    Config, Coordinates, PeakHoursReader, PredictionRequest, PredictionResult, TrafficPredictor,
    TrafficService, peak_hours::MalformedLinePolicy, provider::provider_from_config,
    service::current_status,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "traffic", version, about = "Traffic volume prediction CLI")]
pub struct Cli {
    /// Log verbosity (error, warn, info, debug, trace). Logs go to stderr.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the OpenWeather API key and default location.
    Configure,

    /// Predict traffic volume for a date and hour (UTC).
    Predict {
        /// Date as YYYY-MM-DD.
        #[arg(long)]
        date: NaiveDate,

        /// Hour of day, 0-23.
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..24))]
        hour: u32,

        /// Holiday name as known to the model, e.g. "Christmas Day".
        #[arg(long, default_value = "None")]
        holiday: String,

        /// Replace the provider's rain volume for the last hour (mm).
        #[arg(long = "rain-1h")]
        rain_1h: Option<f64>,

        /// Replace the provider's snow volume for the last hour (mm).
        #[arg(long = "snow-1h")]
        snow_1h: Option<f64>,

        /// Replace the provider's cloud coverage (%).
        #[arg(long = "clouds-all")]
        clouds_all: Option<f64>,

        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,

        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,

        /// Directory holding the model artifacts; overrides the config.
        #[arg(long)]
        model_dir: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
    },

    /// Show the six busiest hours from the batch analytics.
    PeakHours {
        /// Directory of newline-delimited JSON files; overrides the config.
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Skip malformed lines instead of failing.
        #[arg(long)]
        skip_malformed: bool,
    },

    /// Rough congestion estimate from the current weather.
    Status {
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,

        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Predict {
                date,
                hour,
                holiday,
                rain_1h,
                snow_1h,
                clouds_all,
                lat,
                lon,
                model_dir,
                format,
            } => {
                let config = Config::load()?;
                let request = PredictionRequest {
                    date,
                    hour,
                    holiday,
                    rain_1h,
                    snow_1h,
                    clouds_all,
                    lat,
                    lon,
                };

                let service = build_service(&config, model_dir)?;
                let result = service.predict(&request).await?;
                print_prediction(&result, format)
            }
            Command::PeakHours {
                dir,
                skip_malformed,
            } => {
                let config = Config::load()?;
                let mut reader = PeakHoursReader::from_config(&config.analytics);
                if let Some(dir) = dir {
                    reader =
                        PeakHoursReader::new(dir).with_policy(config.analytics.malformed_lines);
                }
                if skip_malformed {
                    reader = reader.with_policy(MalformedLinePolicy::Skip);
                }

                let records = reader.top().with_context(|| {
                    format!("Failed to read peak hours from {}", reader.dir().display())
                })?;
                println!("{}", serde_json::to_string_pretty(&records)?);
                Ok(())
            }
            Command::Status { lat, lon } => {
                let config = Config::load()?;
                let provider = provider_from_config(&config)?;
                let coords = Coordinates {
                    lat: lat.unwrap_or(config.location.lat),
                    lon: lon.unwrap_or(config.location.lon),
                };

                let status = current_status(provider.as_ref(), coords)
                    .await
                    .context("Failed to fetch current weather")?;
                println!("{}", serde_json::to_string_pretty(&status)?);
                Ok(())
            }
        }
    }
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    let api_key = inquire::Password::new("OpenWeather API key:")
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    let lat = inquire::CustomType::<f64>::new("Default latitude:")
        .with_default(config.location.lat)
        .prompt()
        .context("Failed to read latitude")?;

    let lon = inquire::CustomType::<f64>::new("Default longitude:")
        .with_default(config.location.lon)
        .prompt()
        .context("Failed to read longitude")?;

    config.set_api_key(api_key.trim().to_string());
    config.location = Coordinates { lat, lon };
    config.save()?;

    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

fn build_service(config: &Config, model_dir: Option<PathBuf>) -> anyhow::Result<TrafficService> {
    let provider = provider_from_config(config)?;

    let dir = model_dir.unwrap_or_else(|| config.model.dir.clone());
    let predictor = TrafficPredictor::load(&dir, &config.model.fallbacks())
        .with_context(|| format!("Failed to load model artifacts from {}", dir.display()))?;

    Ok(TrafficService::new(Arc::from(provider), Arc::new(predictor))
        .with_default_location(config.location))
}

fn print_prediction(result: &PredictionResult, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Text => println!("{}", render_prediction(result)),
    }
    Ok(())
}

fn render_prediction(result: &PredictionResult) -> String {
    format!(
        "{} vehicles/h ({}) | {}, {:.2} K, rain {:.2} mm, snow {:.2} mm, clouds {:.0}%",
        result.traffic_volume,
        result.traffic_level,
        result.weather_main,
        result.temp,
        result.rain_1h,
        result.snow_1h,
        result.clouds_all,
    )
}
