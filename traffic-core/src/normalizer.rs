use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::{Result, TrafficError};
use crate::model::{Coordinates, WeatherRecord};
use crate::provider::WeatherProvider;

/// Weather for `coords` at `at`: the point-in-time lookup first, the current
/// conditions if that fails. No retries beyond that single fallback.
pub async fn resolve_weather(
    provider: &dyn WeatherProvider,
    at: DateTime<Utc>,
    coords: Coordinates,
) -> Result<WeatherRecord> {
    let primary = match provider.historical(at, coords).await {
        Ok(record) => return Ok(record),
        Err(e) => e,
    };

    warn!(
        error = %primary,
        "point-in-time weather lookup failed, falling back to current conditions"
    );

    provider
        .current(coords)
        .await
        .map_err(|fallback| TrafficError::WeatherUnavailable { primary, fallback })
}
