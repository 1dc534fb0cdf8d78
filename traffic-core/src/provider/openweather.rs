use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::OpenWeatherConfig,
    model::{Coordinates, TemperatureUnit, WeatherRecord},
};

use super::{ProviderError, WeatherProvider};

pub const TIMEMACHINE_URL: &str = "https://api.openweathermap.org/data/2.5/onecall/timemachine";
pub const CURRENT_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Requests use `units=metric`, so every record this provider emits is Celsius.
const UNITS: &str = "metric";
const FREEZING_C: f64 = 0.0;

// Readings assumed when a point-in-time entry leaves them out.
const DEFAULT_TEMPERATURE_C: f64 = 25.0;
const DEFAULT_HUMIDITY_PCT: f64 = 50.0;
const DEFAULT_WIND_SPEED_MPS: f64 = 2.0;
const DEFAULT_CONDITION: &str = "Clear";

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    http: Client,
    timemachine_url: String,
    current_url: String,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String) -> Result<Self, ProviderError> {
        Self::with_endpoints(
            api_key,
            TIMEMACHINE_URL.to_string(),
            CURRENT_URL.to_string(),
            Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS),
        )
    }

    pub fn with_endpoints(
        api_key: String,
        timemachine_url: String,
        current_url: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            api_key,
            http,
            timemachine_url,
            current_url,
        })
    }

    pub fn from_config(config: &OpenWeatherConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ProviderError::MissingApiKey)?;

        Self::with_endpoints(
            api_key,
            config.timemachine_url.clone(),
            config.current_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn fetch_historical(
        &self,
        at: DateTime<Utc>,
        coords: Coordinates,
    ) -> Result<WeatherRecord, ProviderError> {
        let query = TimemachineQuery {
            lat: coords.lat,
            lon: coords.lon,
            dt: at.timestamp(),
            appid: &self.api_key,
            units: UNITS,
        };

        debug!(
            dt = query.dt,
            lat = coords.lat,
            lon = coords.lon,
            "OpenWeather point-in-time lookup"
        );
        let body = self.get(&self.timemachine_url, &query).await?;
        parse_timemachine(&body)
    }

    async fn fetch_current(&self, coords: Coordinates) -> Result<WeatherRecord, ProviderError> {
        let query = CurrentQuery {
            lat: coords.lat,
            lon: coords.lon,
            appid: &self.api_key,
            units: UNITS,
        };

        debug!(lat = coords.lat, lon = coords.lon, "OpenWeather current lookup");
        let body = self.get(&self.current_url, &query).await?;
        parse_current(&body)
    }

    async fn get<Q: Serialize + ?Sized>(
        &self,
        url: &str,
        query: &Q,
    ) -> Result<String, ProviderError> {
        let res = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if status.is_success() {
            return Ok(body);
        }

        let message = extract_error_message(&body).unwrap_or_else(|| truncate_body(&body));
        Err(ProviderError::Http {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn historical(
        &self,
        at: DateTime<Utc>,
        coords: Coordinates,
    ) -> Result<WeatherRecord, ProviderError> {
        self.fetch_historical(at, coords).await
    }

    async fn current(&self, coords: Coordinates) -> Result<WeatherRecord, ProviderError> {
        self.fetch_current(coords).await
    }
}

#[derive(Debug, Serialize)]
struct TimemachineQuery<'a> {
    lat: f64,
    lon: f64,
    dt: i64,
    appid: &'a str,
    units: &'a str,
}

#[derive(Debug, Serialize)]
struct CurrentQuery<'a> {
    lat: f64,
    lon: f64,
    appid: &'a str,
    units: &'a str,
}

#[derive(Debug, Deserialize)]
struct OwCondition {
    main: Option<String>,
}

/// `rain` / `snow` block. Only the object form carries a reading; any other
/// shape is kept so the caller can fall back to an estimate.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OwPrecipitation {
    Object {
        #[serde(rename = "1h")]
        one_hour: Option<f64>,
    },
    Other(serde_json::Value),
}

impl OwPrecipitation {
    fn amount(&self) -> Option<f64> {
        match self {
            OwPrecipitation::Object { one_hour } => Some(one_hour.unwrap_or(0.0)),
            OwPrecipitation::Other(_) => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct OwHourly {
    temp: Option<f64>,
    humidity: Option<f64>,
    wind_speed: Option<f64>,
    clouds: Option<f64>,
    pop: Option<f64>,
    rain: Option<OwPrecipitation>,
    snow: Option<OwPrecipitation>,
    #[serde(default)]
    weather: Vec<OwCondition>,
}

#[derive(Debug, Deserialize)]
struct OwTimemachineResponse {
    hourly: Option<Vec<OwHourly>>,
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OwClouds {
    Object { all: Option<f64> },
    Bare(f64),
}

impl OwClouds {
    fn all(&self) -> f64 {
        match self {
            OwClouds::Object { all } => all.unwrap_or(0.0),
            OwClouds::Bare(all) => *all,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    main: OwMain,
    #[serde(default)]
    weather: Vec<OwCondition>,
    wind: OwWind,
    clouds: Option<OwClouds>,
    rain: Option<OwPrecipitation>,
    snow: Option<OwPrecipitation>,
}

#[derive(Debug, Deserialize)]
struct OwErrorBody {
    message: Option<String>,
}

fn parse_timemachine(body: &str) -> Result<WeatherRecord, ProviderError> {
    let parsed: OwTimemachineResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("timemachine payload: {e}")))?;

    // No `hourly` key at all reads as an entry with every field missing.
    let Some(entries) = parsed.hourly else {
        debug!("timemachine payload without hourly data, using default readings");
        return Ok(normalize_hourly(&OwHourly::default()));
    };

    let hourly = entries.first().ok_or_else(|| {
        ProviderError::InvalidResponse("timemachine payload: no hourly entries".to_string())
    })?;

    Ok(normalize_hourly(hourly))
}

fn parse_current(body: &str) -> Result<WeatherRecord, ProviderError> {
    let parsed: OwCurrentResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("current payload: {e}")))?;

    normalize_current(&parsed)
}

/// Point-in-time entry: missing rain is estimated as `pop × clouds / 100`;
/// snow gets the same estimate only below freezing.
fn normalize_hourly(hourly: &OwHourly) -> WeatherRecord {
    let temperature = hourly.temp.unwrap_or(DEFAULT_TEMPERATURE_C);
    let clouds_all = hourly.clouds.unwrap_or(0.0);
    let pop_estimate = hourly.pop.map(|pop| pop * clouds_all / 100.0);

    let rain_1h = hourly.rain.as_ref().and_then(OwPrecipitation::amount).or(pop_estimate);

    let snow_1h = match hourly.snow.as_ref().and_then(OwPrecipitation::amount) {
        Some(snow) => Some(snow),
        None if temperature < FREEZING_C => pop_estimate,
        None => None,
    };

    let condition = hourly
        .weather
        .first()
        .and_then(|w| w.main.clone())
        .unwrap_or_else(|| DEFAULT_CONDITION.to_string());

    WeatherRecord {
        temperature,
        temperature_unit: TemperatureUnit::Celsius,
        humidity_pct: hourly.humidity.unwrap_or(DEFAULT_HUMIDITY_PCT),
        condition,
        wind_speed_mps: hourly.wind_speed.unwrap_or(DEFAULT_WIND_SPEED_MPS),
        rain_1h,
        snow_1h,
        clouds_all: Some(clouds_all),
    }
}

/// Current observation: with no precipitation forecast to go on, missing rain
/// is proxied by the cloud fraction; snow likewise, but only below freezing.
fn normalize_current(parsed: &OwCurrentResponse) -> Result<WeatherRecord, ProviderError> {
    let condition = parsed
        .weather
        .first()
        .and_then(|w| w.main.clone())
        .ok_or_else(|| {
            ProviderError::InvalidResponse("current payload: missing weather condition".to_string())
        })?;

    let temperature = parsed.main.temp;
    let clouds_all = parsed.clouds.as_ref().map(OwClouds::all);
    let cloud_fraction = clouds_all.map(|c| c / 100.0);

    let rain_1h = parsed.rain.as_ref().and_then(OwPrecipitation::amount).or(cloud_fraction);

    let snow_1h = match parsed.snow.as_ref().and_then(OwPrecipitation::amount) {
        Some(snow) => Some(snow),
        None if temperature < FREEZING_C => cloud_fraction,
        None => None,
    };

    Ok(WeatherRecord {
        temperature,
        temperature_unit: TemperatureUnit::Celsius,
        humidity_pct: parsed.main.humidity,
        condition,
        wind_speed_mps: parsed.wind.speed,
        rain_1h,
        snow_1h,
        clouds_all,
    })
}

fn extract_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<OwErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn assert_close(actual: Option<f64>, expected: f64) {
        let actual = actual.expect("value present");
        assert!((actual - expected).abs() < 1e-9, "{actual} != {expected}");
    }

    #[test]
    fn hourly_uses_explicit_rain_and_snow() {
        let record = parse_timemachine(
            r#"{"hourly": [{
                "temp": -3.0, "humidity": 90, "wind_speed": 5.5, "clouds": 100, "pop": 0.9,
                "rain": {"1h": 0.3}, "snow": {"1h": 1.7},
                "weather": [{"main": "Snow", "description": "light snow"}]
            }]}"#,
        )
        .expect("parse");

        assert_eq!(record.condition, "Snow");
        assert_eq!(record.temperature_unit, TemperatureUnit::Celsius);
        assert_close(record.rain_1h, 0.3);
        assert_close(record.snow_1h, 1.7);
        assert_close(record.clouds_all, 100.0);
    }

    #[test]
    fn hourly_estimates_rain_from_pop_and_clouds() {
        let record = parse_timemachine(
            r#"{"hourly": [{"temp": 18.0, "clouds": 80, "pop": 0.5,
                "weather": [{"main": "Clouds"}]}]}"#,
        )
        .expect("parse");

        assert_close(record.rain_1h, 0.4);
        // Above freezing, no snow estimate.
        assert_eq!(record.snow_1h, None);
    }

    #[test]
    fn hourly_estimates_snow_only_below_freezing() {
        let record = parse_timemachine(
            r#"{"hourly": [{"temp": -1.5, "clouds": 60, "pop": 0.5,
                "weather": [{"main": "Snow"}]}]}"#,
        )
        .expect("parse");

        assert_close(record.snow_1h, 0.3);
        assert_close(record.rain_1h, 0.3);
    }

    #[test]
    fn hourly_without_readings_uses_defaults() {
        let record = parse_timemachine(r#"{"hourly": [{}]}"#).expect("parse");

        assert_eq!(record.temperature, 25.0);
        assert_eq!(record.humidity_pct, 50.0);
        assert_eq!(record.wind_speed_mps, 2.0);
        assert_eq!(record.condition, "Clear");
        assert_eq!(record.rain_1h, None);
        assert_eq!(record.snow_1h, None);
        assert_close(record.clouds_all, 0.0);
    }

    #[test]
    fn hourly_with_non_object_rain_falls_back_to_pop_estimate() {
        let record = parse_timemachine(
            r#"{"hourly": [{"temp": 10.0, "clouds": 50, "pop": 0.2, "rain": 0.7,
                "snow": "n/a", "weather": [{"main": "Rain"}]}]}"#,
        )
        .expect("parse");

        assert_eq!(record.condition, "Rain");
        assert_close(record.rain_1h, 0.1);
        assert_eq!(record.snow_1h, None);
    }

    #[test]
    fn hourly_with_non_object_snow_below_freezing_uses_estimate() {
        let record = parse_timemachine(
            r#"{"hourly": [{"temp": -2.0, "clouds": 40, "pop": 0.5, "snow": [1.2]}]}"#,
        )
        .expect("parse");

        assert_close(record.snow_1h, 0.2);
        assert_close(record.rain_1h, 0.2);
    }

    #[test]
    fn timemachine_without_hourly_key_uses_default_readings() {
        let record = parse_timemachine(r#"{"lat": 1.0}"#).expect("parse");

        assert_eq!(record.temperature, 25.0);
        assert_eq!(record.humidity_pct, 50.0);
        assert_eq!(record.wind_speed_mps, 2.0);
        assert_eq!(record.condition, "Clear");
        assert_eq!(record.rain_1h, None);
        assert_close(record.clouds_all, 0.0);
    }

    #[test]
    fn current_with_non_object_rain_uses_cloud_proxy() {
        let record = parse_current(
            r#"{"main": {"temp": 12.0, "humidity": 80}, "weather": [{"main": "Drizzle"}],
                "wind": {"speed": 2.0}, "clouds": {"all": 30}, "rain": 1.5}"#,
        )
        .expect("parse");

        assert_close(record.rain_1h, 0.3);
    }

    #[test]
    fn timemachine_without_hourly_entries_is_invalid() {
        let err = parse_timemachine(r#"{"lat": 12.97, "hourly": []}"#).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[test]
    fn current_proxies_rain_with_cloud_fraction() {
        let record = parse_current(
            r#"{"main": {"temp": 24.2, "humidity": 70}, "weather": [{"main": "Haze"}],
                "wind": {"speed": 3.6}, "clouds": {"all": 40}}"#,
        )
        .expect("parse");

        assert_eq!(record.condition, "Haze");
        assert_close(record.rain_1h, 0.4);
        assert_eq!(record.snow_1h, None);
        assert_close(record.clouds_all, 40.0);
    }

    #[test]
    fn current_cold_and_cloudy_estimates_snow() {
        let record = parse_current(
            r#"{"main": {"temp": -4.0, "humidity": 85}, "weather": [{"main": "Clouds"}],
                "wind": {"speed": 1.0}, "clouds": 75, "rain": {"1h": 0.0}}"#,
        )
        .expect("parse");

        assert_close(record.rain_1h, 0.0);
        assert_close(record.snow_1h, 0.75);
    }

    #[test]
    fn current_without_cloud_data_leaves_precipitation_absent() {
        let record = parse_current(
            r#"{"main": {"temp": -4.0, "humidity": 85}, "weather": [{"main": "Clear"}],
                "wind": {"speed": 1.0}}"#,
        )
        .expect("parse");

        assert_eq!(record.rain_1h, None);
        assert_eq!(record.snow_1h, None);
        assert_eq!(record.clouds_all, None);
    }

    #[test]
    fn current_requires_core_fields() {
        let err = parse_current(r#"{"weather": [{"main": "Clear"}]}"#).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));

        let err = parse_current(
            r#"{"main": {"temp": 20.0, "humidity": 50}, "weather": [], "wind": {"speed": 1.0}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing weather condition"));
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let body = "é".repeat(300);
        let truncated = truncate_body(&body);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 203);
    }

    fn provider_for(server: &MockServer) -> OpenWeatherProvider {
        OpenWeatherProvider::with_endpoints(
            "TEST_KEY".to_string(),
            format!("{}/timemachine", server.uri()),
            format!("{}/weather", server.uri()),
            Duration::from_secs(5),
        )
        .expect("client")
    }

    #[tokio::test]
    async fn historical_sends_timestamp_and_metric_units() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/timemachine"))
            .and(query_param("dt", "1705305600"))
            .and(query_param("units", "metric"))
            .and(query_param("appid", "TEST_KEY"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hourly": [{
                    "temp": 15.0, "humidity": 88, "wind_speed": 4.1, "clouds": 90,
                    "rain": {"1h": 2.0},
                    "weather": [{"main": "Rain"}]
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let at = Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap();
        let record = provider_for(&server)
            .historical(at, Coordinates::default())
            .await
            .expect("historical lookup");

        assert_eq!(record.condition, "Rain");
        assert_eq!(record.temperature, 15.0);
        assert_close(record.rain_1h, 2.0);
    }

    #[tokio::test]
    async fn http_failure_carries_provider_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "cod": 401,
                "message": "Invalid API key. Please see https://openweathermap.org/faq#error401"
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .current(Coordinates::default())
            .await
            .unwrap_err();

        match err {
            ProviderError::Http { status, message } => {
                assert_eq!(status, 401);
                assert!(message.starts_with("Invalid API key"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn from_config_requires_api_key() {
        let cfg = OpenWeatherConfig::default();
        let err = OpenWeatherProvider::from_config(&cfg).unwrap_err();
        assert_eq!(err, ProviderError::MissingApiKey);

        let cfg = OpenWeatherConfig {
            api_key: Some("   ".to_string()),
            ..OpenWeatherConfig::default()
        };
        assert!(OpenWeatherProvider::from_config(&cfg).is_err());
    }
}
