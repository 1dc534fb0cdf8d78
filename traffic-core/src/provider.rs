use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use thiserror::Error;

use crate::{
    Config,
    model::{Coordinates, WeatherRecord},
    provider::openweather::OpenWeatherProvider,
};

pub mod openweather;

/// Source of weather for a place, either at a past instant or right now.
///
/// Implementations return records already normalized; absent rain/snow/cloud
/// readings are `None`, never errors.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn historical(
        &self,
        at: DateTime<Utc>,
        coords: Coordinates,
    ) -> Result<WeatherRecord, ProviderError>;

    async fn current(&self, coords: Coordinates) -> Result<WeatherRecord, ProviderError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http error ({status}): {message}")]
    Http { status: u16, message: String },
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("no API key configured")]
    MissingApiKey,
}

/// Construct the weather provider described by the config.
pub fn provider_from_config(config: &Config) -> anyhow::Result<Box<dyn WeatherProvider>> {
    let provider = OpenWeatherProvider::from_config(&config.openweather).map_err(|e| match e {
        ProviderError::MissingApiKey => anyhow::anyhow!(
            "No OpenWeather API key configured.\n\
             Hint: run `traffic configure` or set {}.",
            crate::config::API_KEY_ENV
        ),
        other => anyhow::anyhow!("Failed to build OpenWeather client: {other}"),
    })?;

    Ok(Box::new(provider))
}
