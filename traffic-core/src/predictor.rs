use std::collections::HashMap;
use std::fmt::Debug;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::encoder::{
    CategoryEncoder, EncodedFeatures, FeatureColumn, FeatureEncoder, FeatureVector,
};
use crate::error::{Result, TrafficError};
use crate::model::{PredictionResult, TrafficLevel, WeatherRecord};

pub const MODEL_FILE: &str = "traffic_model.json";
pub const WEATHER_ENCODER_FILE: &str = "weather_encoder.json";
pub const HOLIDAY_ENCODER_FILE: &str = "holiday_encoder.json";

/// A trained model: one feature row in, one volume estimate out.
pub trait RegressionModel: Send + Sync + Debug {
    fn predict(&self, features: &FeatureVector) -> Result<f64>;
}

/// Serialized regression model, tagged by `kind`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    Linear(LinearModel),
    Forest(ForestModel),
}

impl ModelArtifact {
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            ModelArtifact::Linear(linear) => linear.validate(),
            ModelArtifact::Forest(forest) => forest.validate(),
        }
    }
}

impl RegressionModel for ModelArtifact {
    fn predict(&self, features: &FeatureVector) -> Result<f64> {
        match self {
            ModelArtifact::Linear(linear) => linear.predict(features),
            ModelArtifact::Forest(forest) => forest.predict(features),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinearModel {
    pub intercept: f64,
    /// Columns without a coefficient contribute nothing.
    #[serde(default)]
    pub coefficients: HashMap<FeatureColumn, f64>,
}

impl LinearModel {
    fn validate(&self) -> std::result::Result<(), String> {
        if !self.intercept.is_finite() {
            return Err("intercept is not finite".to_string());
        }
        if let Some((column, _)) = self.coefficients.iter().find(|(_, c)| !c.is_finite()) {
            return Err(format!("coefficient for {column:?} is not finite"));
        }
        Ok(())
    }
}

impl RegressionModel for LinearModel {
    fn predict(&self, features: &FeatureVector) -> Result<f64> {
        let sum = FeatureColumn::ALL
            .iter()
            .filter_map(|column| {
                self.coefficients
                    .get(column)
                    .map(|coef| coef * features.value(*column))
            })
            .sum::<f64>();
        Ok(self.intercept + sum)
    }
}

/// Averaged ensemble of regression trees.
#[derive(Debug, Clone, Deserialize)]
pub struct ForestModel {
    pub trees: Vec<RegressionTree>,
}

impl ForestModel {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate().map_err(|e| format!("tree {i}: {e}"))?;
        }
        Ok(())
    }
}

impl RegressionModel for ForestModel {
    fn predict(&self, features: &FeatureVector) -> Result<f64> {
        if self.trees.is_empty() {
            return Err(TrafficError::Scoring("forest has no trees".to_string()));
        }
        let mut total = 0.0;
        for tree in &self.trees {
            total += tree.predict(features)?;
        }
        Ok(total / self.trees.len() as f64)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: FeatureColumn,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// Nodes are stored parent-before-child; node 0 is the root.
#[derive(Debug, Clone, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        let len = self.nodes.len();
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    if !threshold.is_finite() {
                        return Err(format!("node {i} has a non-finite threshold"));
                    }
                    // Children after their parent means every walk terminates.
                    for child in [*left, *right] {
                        if child <= i || child >= len {
                            return Err(format!("node {i} points at invalid child {child}"));
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(format!("leaf {i} has a non-finite value"));
                    }
                }
            }
        }
        Ok(())
    }

    fn predict(&self, features: &FeatureVector) -> Result<f64> {
        let mut idx = 0;
        // Bounded by node count so a malformed tree cannot spin forever.
        for _ in 0..self.nodes.len() {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { value }) => return Ok(*value),
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    idx = if features.value(*feature) <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                None => {
                    return Err(TrafficError::Scoring(format!(
                        "tree walk reached missing node {idx}"
                    )));
                }
            }
        }
        Err(TrafficError::Scoring(
            "tree walk did not reach a leaf".to_string(),
        ))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct EncoderArtifact {
    classes: Vec<String>,
    #[serde(default)]
    fallback: Option<String>,
}

/// Class substituted for unseen categories when an encoder artifact does not name one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderFallbacks {
    pub holiday: String,
    pub weather: String,
}

impl Default for EncoderFallbacks {
    fn default() -> Self {
        Self {
            holiday: "None".to_string(),
            weather: "Clear".to_string(),
        }
    }
}

/// The trained model and its two category encoders, loaded once and shared
/// read-only by every prediction.
#[derive(Debug)]
pub struct TrafficPredictor {
    model: Box<dyn RegressionModel>,
    encoder: FeatureEncoder,
}

impl TrafficPredictor {
    pub fn new(
        model: impl RegressionModel + 'static,
        weather_encoder: CategoryEncoder,
        holiday_encoder: CategoryEncoder,
    ) -> Self {
        Self {
            model: Box::new(model),
            encoder: FeatureEncoder::new(weather_encoder, holiday_encoder),
        }
    }

    /// Load `traffic_model.json`, `weather_encoder.json` and `holiday_encoder.json` from `dir`.
    pub fn load(dir: &Path, fallbacks: &EncoderFallbacks) -> Result<Self> {
        info!("Loading model artifacts from {}", dir.display());

        let model_path = dir.join(MODEL_FILE);
        let model: ModelArtifact = read_json(&model_path)?;
        model
            .validate()
            .map_err(|message| TrafficError::artifact(&model_path, message))?;

        let weather_encoder = load_encoder(&dir.join(WEATHER_ENCODER_FILE), &fallbacks.weather)?;
        let holiday_encoder = load_encoder(&dir.join(HOLIDAY_ENCODER_FILE), &fallbacks.holiday)?;

        info!(
            weather_classes = weather_encoder.classes().len(),
            holiday_classes = holiday_encoder.classes().len(),
            "Model artifacts loaded"
        );

        Ok(Self::new(model, weather_encoder, holiday_encoder))
    }

    pub fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    /// Raw volume estimate for one feature row.
    pub fn score(&self, features: &FeatureVector) -> Result<f64> {
        let volume = self.model.predict(features)?;
        if !volume.is_finite() {
            return Err(TrafficError::Scoring(format!(
                "model returned a non-finite volume: {volume}"
            )));
        }
        Ok(volume)
    }

    pub fn classify(&self, encoded: &EncodedFeatures) -> Result<PredictionResult> {
        let volume = self.score(&encoded.vector)?;
        let v = &encoded.vector;

        Ok(PredictionResult {
            traffic_volume: volume.round_ties_even() as i64,
            traffic_level: TrafficLevel::from_volume(volume),
            weather_main: encoded.weather_main,
            temp: v.temp,
            rain_1h: v.rain_1h,
            snow_1h: v.snow_1h,
            clouds_all: v.clouds_all,
        })
    }

    pub fn predict(
        &self,
        weather: &WeatherRecord,
        at: DateTime<Utc>,
        holiday: &str,
    ) -> Result<PredictionResult> {
        let encoded = self.encoder.encode(weather, at, holiday)?;
        self.classify(&encoded)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).map_err(|e| TrafficError::io(path, e))?;
    serde_json::from_str(&contents).map_err(|e| TrafficError::artifact(path, e.to_string()))
}

fn load_encoder(path: &Path, default_fallback: &str) -> Result<CategoryEncoder> {
    let artifact: EncoderArtifact = read_json(path)?;
    let fallback = artifact.fallback.as_deref().unwrap_or(default_fallback);
    CategoryEncoder::new(artifact.classes, fallback)
        .map_err(|e| TrafficError::artifact(path, e.to_string()))
}
