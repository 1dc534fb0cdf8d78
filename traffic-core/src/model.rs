use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::encoder::WeatherClass;
use crate::error::{Result, TrafficError};

/// Bengaluru city centre, the location predictions use unless told otherwise.
pub const DEFAULT_LATITUDE: f64 = 12.9716;
pub const DEFAULT_LONGITUDE: f64 = 77.5946;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Default for Coordinates {
    fn default() -> Self {
        Self {
            lat: DEFAULT_LATITUDE,
            lon: DEFAULT_LONGITUDE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureUnit {
    Celsius,
    Kelvin,
    /// Unit not declared by the source; the encoder guesses from magnitude.
    Unknown,
}

/// Canonical weather for one place and hour, independent of which provider
/// endpoint produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub temperature: f64,
    pub temperature_unit: TemperatureUnit,
    pub humidity_pct: f64,
    /// Primary condition as reported, e.g. "Rain" or "Haze".
    pub condition: String,
    pub wind_speed_mps: f64,
    pub rain_1h: Option<f64>,
    pub snow_1h: Option<f64>,
    pub clouds_all: Option<f64>,
}

fn default_holiday() -> String {
    "None".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub date: NaiveDate,
    pub hour: u32,
    #[serde(default = "default_holiday")]
    pub holiday: String,
    #[serde(default)]
    pub rain_1h: Option<f64>,
    #[serde(default)]
    pub snow_1h: Option<f64>,
    #[serde(default)]
    pub clouds_all: Option<f64>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
}

impl PredictionRequest {
    pub fn new(date: NaiveDate, hour: u32) -> Self {
        Self {
            date,
            hour,
            holiday: default_holiday(),
            rain_1h: None,
            snow_1h: None,
            clouds_all: None,
            lat: None,
            lon: None,
        }
    }

    pub fn with_holiday(mut self, holiday: impl Into<String>) -> Self {
        self.holiday = holiday.into();
        self
    }

    /// The request's date and hour as a UTC instant.
    pub fn timestamp(&self) -> Result<DateTime<Utc>> {
        if self.hour > 23 {
            return Err(TrafficError::InvalidRequest(format!(
                "hour must be between 0 and 23, got {}",
                self.hour
            )));
        }

        self.date
            .and_hms_opt(self.hour, 0, 0)
            .map(|naive| naive.and_utc())
            .ok_or_else(|| {
                TrafficError::InvalidRequest(format!(
                    "{} {:02}:00 is not a valid timestamp",
                    self.date, self.hour
                ))
            })
    }

    pub fn coordinates(&self, default: Coordinates) -> Coordinates {
        Coordinates {
            lat: self.lat.unwrap_or(default.lat),
            lon: self.lon.unwrap_or(default.lon),
        }
    }

    /// Replace rain/snow/cloud readings with any values given on the request.
    pub fn apply_overrides(&self, mut weather: WeatherRecord) -> WeatherRecord {
        if let Some(rain) = self.rain_1h {
            weather.rain_1h = Some(rain);
        }
        if let Some(snow) = self.snow_1h {
            weather.snow_1h = Some(snow);
        }
        if let Some(clouds) = self.clouds_all {
            weather.clouds_all = Some(clouds);
        }
        weather
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrafficLevel {
    #[serde(rename = "Low Traffic")]
    Low,
    #[serde(rename = "Medium Traffic")]
    Medium,
    #[serde(rename = "High Traffic")]
    High,
}

impl TrafficLevel {
    pub const MEDIUM_THRESHOLD: f64 = 2000.0;
    pub const HIGH_THRESHOLD: f64 = 4500.0;

    /// Bucket an unrounded volume estimate.
    pub fn from_volume(volume: f64) -> Self {
        if volume < Self::MEDIUM_THRESHOLD {
            TrafficLevel::Low
        } else if volume < Self::HIGH_THRESHOLD {
            TrafficLevel::Medium
        } else {
            TrafficLevel::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficLevel::Low => "Low Traffic",
            TrafficLevel::Medium => "Medium Traffic",
            TrafficLevel::High => "High Traffic",
        }
    }
}

impl std::fmt::Display for TrafficLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicted volume plus the weather values that were fed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub traffic_volume: i64,
    pub traffic_level: TrafficLevel,
    pub weather_main: WeatherClass,
    /// Kelvin.
    pub temp: f64,
    pub rain_1h: f64,
    pub snow_1h: f64,
    pub clouds_all: f64,
}

/// Rule-of-thumb congestion derived from the current condition alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Congestion {
    Low,
    Medium,
    High,
}

impl Congestion {
    pub fn from_condition(condition: &str) -> Self {
        match condition.trim() {
            "Rain" => Congestion::High,
            "Clouds" => Congestion::Medium,
            _ => Congestion::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficStatus {
    pub weather: WeatherRecord,
    pub traffic_prediction: Congestion,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid date")
    }

    #[test]
    fn classification_thresholds_are_exact() {
        assert_eq!(TrafficLevel::from_volume(1999.9), TrafficLevel::Low);
        assert_eq!(TrafficLevel::from_volume(2000.0), TrafficLevel::Medium);
        assert_eq!(TrafficLevel::from_volume(4499.9), TrafficLevel::Medium);
        assert_eq!(TrafficLevel::from_volume(4500.0), TrafficLevel::High);
        assert_eq!(TrafficLevel::from_volume(-5.0), TrafficLevel::Low);
    }

    #[test]
    fn traffic_level_serializes_as_label() {
        let json = serde_json::to_string(&TrafficLevel::Medium).expect("serialize");
        assert_eq!(json, "\"Medium Traffic\"");
        assert_eq!(TrafficLevel::High.to_string(), "High Traffic");
    }

    #[test]
    fn timestamp_is_utc_hour() {
        let req = PredictionRequest::new(date("2024-01-15"), 8);
        let ts = req.timestamp().expect("valid timestamp");
        assert_eq!(ts.timestamp(), 1_705_305_600);
    }

    #[test]
    fn timestamp_rejects_hour_out_of_range() {
        let req = PredictionRequest::new(date("2024-01-15"), 24);
        let err = req.timestamp().unwrap_err();
        assert!(matches!(err, TrafficError::InvalidRequest(_)));
    }

    #[test]
    fn request_defaults_when_deserialized() {
        let req: PredictionRequest =
            serde_json::from_str(r#"{"date": "2024-03-02", "hour": 17}"#).expect("parse");
        assert_eq!(req.holiday, "None");
        assert_eq!(req.rain_1h, None);
        assert_eq!(req.coordinates(Coordinates::default()), Coordinates::default());
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let mut req = PredictionRequest::new(date("2024-03-02"), 17);
        req.clouds_all = Some(90.0);

        let weather = WeatherRecord {
            temperature: 21.0,
            temperature_unit: TemperatureUnit::Celsius,
            humidity_pct: 60.0,
            condition: "Clouds".to_string(),
            wind_speed_mps: 3.1,
            rain_1h: Some(0.4),
            snow_1h: None,
            clouds_all: Some(20.0),
        };

        let applied = req.apply_overrides(weather);
        assert_eq!(applied.clouds_all, Some(90.0));
        assert_eq!(applied.rain_1h, Some(0.4));
        assert_eq!(applied.snow_1h, None);
    }

    #[test]
    fn congestion_follows_condition() {
        assert_eq!(Congestion::from_condition("Rain"), Congestion::High);
        assert_eq!(Congestion::from_condition("Clouds"), Congestion::Medium);
        assert_eq!(Congestion::from_condition("Clear"), Congestion::Low);
        assert_eq!(Congestion::from_condition("Haze"), Congestion::Low);
    }
}
