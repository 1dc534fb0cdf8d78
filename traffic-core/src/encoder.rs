//! Feature encoding: turns a [`WeatherRecord`] plus the request's time and
//! holiday into the row the regression model was fit on.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TrafficError};
use crate::model::{TemperatureUnit, WeatherRecord};

pub const CELSIUS_TO_KELVIN: f64 = 273.15;

/// Readings below this magnitude are taken to be Celsius when the unit is unknown.
const CELSIUS_MAGNITUDE_LIMIT: f64 = 100.0;

/// Weather classes the model was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeatherClass {
    Clear,
    Clouds,
    Rain,
    Snow,
}

impl WeatherClass {
    /// Map a provider condition string ("drizzle", "HAZE", ...) onto a model class.
    /// Anything outside the known vocabulary is treated as clear weather.
    pub fn from_condition(raw: &str) -> Self {
        match capitalize(raw).as_str() {
            "Clear" => WeatherClass::Clear,
            "Clouds" => WeatherClass::Clouds,
            "Rain" | "Drizzle" | "Thunderstorm" => WeatherClass::Rain,
            "Snow" => WeatherClass::Snow,
            "Mist" | "Smoke" | "Haze" | "Dust" | "Fog" | "Sand" | "Ash" | "Squall"
            | "Tornado" => WeatherClass::Clouds,
            _ => WeatherClass::Clear,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherClass::Clear => "Clear",
            WeatherClass::Clouds => "Clouds",
            WeatherClass::Rain => "Rain",
            WeatherClass::Snow => "Snow",
        }
    }
}

impl std::fmt::Display for WeatherClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First letter upper case, the rest lower case.
fn capitalize(raw: &str) -> String {
    let mut chars = raw.trim().chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Guess Kelvin from a bare reading: small magnitudes are Celsius.
pub fn kelvin_from_reading(value: f64) -> f64 {
    if value.abs() < CELSIUS_MAGNITUDE_LIMIT {
        value + CELSIUS_TO_KELVIN
    } else {
        value
    }
}

pub fn to_kelvin(temperature: f64, unit: TemperatureUnit) -> f64 {
    match unit {
        TemperatureUnit::Celsius => temperature + CELSIUS_TO_KELVIN,
        TemperatureUnit::Kelvin => temperature,
        TemperatureUnit::Unknown => kelvin_from_reading(temperature),
    }
}

/// Known classes of one categorical column, with an explicit class to use for
/// values the model never saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryEncoder {
    classes: Vec<String>,
    index: HashMap<String, usize>,
    fallback_id: usize,
}

impl CategoryEncoder {
    pub fn new(classes: Vec<String>, fallback: &str) -> Result<Self> {
        if classes.is_empty() {
            return Err(TrafficError::Encoding(
                "encoder has no known classes".to_string(),
            ));
        }

        let mut index = HashMap::with_capacity(classes.len());
        for (id, class) in classes.iter().enumerate() {
            if index.insert(class.clone(), id).is_some() {
                return Err(TrafficError::Encoding(format!(
                    "class '{class}' appears more than once"
                )));
            }
        }

        let fallback_id = *index.get(fallback).ok_or_else(|| {
            TrafficError::Encoding(format!(
                "fallback class '{fallback}' is not one of the known classes"
            ))
        })?;

        Ok(Self {
            classes,
            index,
            fallback_id,
        })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn fallback(&self) -> &str {
        &self.classes[self.fallback_id]
    }

    pub fn contains(&self, value: &str) -> bool {
        self.index.contains_key(value)
    }

    /// Id of `value`, or of the fallback class when `value` is unknown.
    pub fn encode(&self, value: &str) -> usize {
        match self.index.get(value) {
            Some(id) => *id,
            None => {
                debug!(
                    category = value,
                    fallback = self.fallback(),
                    "unknown category, substituting fallback class"
                );
                self.fallback_id
            }
        }
    }
}

/// Model input columns, in the order the model was fit on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureColumn {
    Hour,
    DayOfWeek,
    IsWeekend,
    Holiday,
    Temp,
    #[serde(rename = "rain_1h")]
    Rain1h,
    #[serde(rename = "snow_1h")]
    Snow1h,
    CloudsAll,
    WeatherMain,
}

impl FeatureColumn {
    pub const COUNT: usize = 9;

    pub const ALL: [FeatureColumn; Self::COUNT] = [
        FeatureColumn::Hour,
        FeatureColumn::DayOfWeek,
        FeatureColumn::IsWeekend,
        FeatureColumn::Holiday,
        FeatureColumn::Temp,
        FeatureColumn::Rain1h,
        FeatureColumn::Snow1h,
        FeatureColumn::CloudsAll,
        FeatureColumn::WeatherMain,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    pub hour: u32,
    /// 0 = Monday .. 6 = Sunday.
    pub day_of_week: u32,
    pub is_weekend: bool,
    pub holiday: usize,
    /// Kelvin.
    pub temp: f64,
    pub rain_1h: f64,
    pub snow_1h: f64,
    pub clouds_all: f64,
    pub weather_main: usize,
}

impl FeatureVector {
    pub fn value(&self, column: FeatureColumn) -> f64 {
        match column {
            FeatureColumn::Hour => f64::from(self.hour),
            FeatureColumn::DayOfWeek => f64::from(self.day_of_week),
            FeatureColumn::IsWeekend => {
                if self.is_weekend {
                    1.0
                } else {
                    0.0
                }
            }
            FeatureColumn::Holiday => self.holiday as f64,
            FeatureColumn::Temp => self.temp,
            FeatureColumn::Rain1h => self.rain_1h,
            FeatureColumn::Snow1h => self.snow_1h,
            FeatureColumn::CloudsAll => self.clouds_all,
            FeatureColumn::WeatherMain => self.weather_main as f64,
        }
    }

    pub fn to_row(&self) -> [f64; FeatureColumn::COUNT] {
        FeatureColumn::ALL.map(|column| self.value(column))
    }
}

/// A feature row together with the weather class it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFeatures {
    pub vector: FeatureVector,
    pub weather_main: WeatherClass,
}

#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    weather: CategoryEncoder,
    holiday: CategoryEncoder,
}

impl FeatureEncoder {
    pub fn new(weather: CategoryEncoder, holiday: CategoryEncoder) -> Self {
        Self { weather, holiday }
    }

    pub fn weather_encoder(&self) -> &CategoryEncoder {
        &self.weather
    }

    pub fn holiday_encoder(&self) -> &CategoryEncoder {
        &self.holiday
    }

    pub fn encode(
        &self,
        weather: &WeatherRecord,
        at: DateTime<Utc>,
        holiday: &str,
    ) -> Result<EncodedFeatures> {
        let day_of_week = at.weekday().num_days_from_monday();
        let weather_main = WeatherClass::from_condition(&weather.condition);

        let vector = FeatureVector {
            hour: at.hour(),
            day_of_week,
            is_weekend: day_of_week >= 5,
            holiday: self.holiday.encode(holiday),
            temp: finite(
                "temp",
                to_kelvin(weather.temperature, weather.temperature_unit),
            )?,
            rain_1h: finite("rain_1h", weather.rain_1h.unwrap_or(0.0))?,
            snow_1h: finite("snow_1h", weather.snow_1h.unwrap_or(0.0))?,
            clouds_all: finite("clouds_all", weather.clouds_all.unwrap_or(0.0))?,
            weather_main: self.weather.encode(weather_main.as_str()),
        };

        debug!(?vector, %weather_main, "encoded feature vector");

        Ok(EncodedFeatures {
            vector,
            weather_main,
        })
    }
}

fn finite(column: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(TrafficError::Encoding(format!(
            "{column} must be a finite number, got {value}"
        )))
    }
}
