use std::sync::Arc;

use tracing::{debug, info};

use crate::error::Result;
use crate::model::{Congestion, Coordinates, PredictionRequest, PredictionResult, TrafficStatus};
use crate::normalizer::resolve_weather;
use crate::predictor::TrafficPredictor;
use crate::provider::WeatherProvider;

/// The prediction pipeline: weather lookup, feature encoding, scoring.
///
/// Holds only read-only state, so one instance can serve concurrent requests.
#[derive(Debug, Clone)]
pub struct TrafficService {
    provider: Arc<dyn WeatherProvider>,
    predictor: Arc<TrafficPredictor>,
    default_location: Coordinates,
}

impl TrafficService {
    pub fn new(provider: Arc<dyn WeatherProvider>, predictor: Arc<TrafficPredictor>) -> Self {
        Self {
            provider,
            predictor,
            default_location: Coordinates::default(),
        }
    }

    pub fn with_default_location(mut self, location: Coordinates) -> Self {
        self.default_location = location;
        self
    }

    pub fn predictor(&self) -> &TrafficPredictor {
        &self.predictor
    }

    pub async fn predict(&self, request: &PredictionRequest) -> Result<PredictionResult> {
        let at = request.timestamp()?;
        let coords = request.coordinates(self.default_location);

        let weather = resolve_weather(self.provider.as_ref(), at, coords).await?;
        debug!(?weather, "resolved weather");
        let weather = request.apply_overrides(weather);

        let result = self.predictor.predict(&weather, at, &request.holiday)?;
        info!(
            %at,
            volume = result.traffic_volume,
            level = %result.traffic_level,
            "traffic predicted"
        );
        Ok(result)
    }
}

/// Rule-based congestion from the current weather; the model is not involved.
pub async fn current_status(
    provider: &dyn WeatherProvider,
    coords: Coordinates,
) -> Result<TrafficStatus> {
    let weather = provider.current(coords).await?;
    let traffic_prediction = Congestion::from_condition(&weather.condition);

    Ok(TrafficStatus {
        weather,
        traffic_prediction,
    })
}
