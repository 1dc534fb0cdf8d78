//! Core library for the `traffic` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Abstraction over weather providers and normalization of their payloads
//! - Feature encoding and scoring against the trained traffic model
//! - The reader for precomputed peak-hour analytics
//!
//! It is used by `traffic-cli`, but can also be embedded in a service.

pub mod config;
pub mod encoder;
pub mod error;
pub mod model;
pub mod normalizer;
pub mod peak_hours;
pub mod predictor;
pub mod provider;
pub mod service;

pub use config::Config;
pub use encoder::{CategoryEncoder, FeatureColumn, FeatureEncoder, FeatureVector, WeatherClass};
pub use error::TrafficError;
pub use model::{
    Congestion, Coordinates, PredictionRequest, PredictionResult, TemperatureUnit, TrafficLevel,
    TrafficStatus, WeatherRecord,
};
pub use peak_hours::{MalformedLinePolicy, PeakHourRecord, PeakHoursReader};
pub use predictor::{EncoderFallbacks, RegressionModel, TrafficPredictor};
pub use provider::{ProviderError, WeatherProvider};
pub use service::TrafficService;
