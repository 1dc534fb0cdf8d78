use std::path::PathBuf;

use thiserror::Error;

use crate::provider::ProviderError;

/// Every failure the prediction pipeline and the peak-hours reader can report.
///
/// Unknown categorical values are not errors; the encoder substitutes a named
/// fallback class for them.
#[derive(Debug, Error)]
pub enum TrafficError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(
        "weather unavailable: point-in-time lookup failed ({primary}); \
         current-weather lookup failed ({fallback})"
    )]
    WeatherUnavailable {
        primary: ProviderError,
        fallback: ProviderError,
    },

    #[error("weather lookup failed: {0}")]
    Weather(#[from] ProviderError),

    #[error("feature encoding failed: {0}")]
    Encoding(String),

    #[error("model scoring failed: {0}")]
    Scoring(String),

    #[error("invalid model artifact {}: {message}", .path.display())]
    Artifact { path: PathBuf, message: String },

    #[error("malformed peak-hours record at {}:{line}: {message}", .path.display())]
    PeakHours {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TrafficError {
    pub(crate) fn artifact(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        TrafficError::Artifact {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TrafficError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = TrafficError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weather_unavailable_mentions_both_lookups() {
        let err = TrafficError::WeatherUnavailable {
            primary: ProviderError::Http {
                status: 401,
                message: "Invalid API key".to_string(),
            },
            fallback: ProviderError::Transport("connection refused".to_string()),
        };

        let msg = err.to_string();
        assert!(msg.contains("point-in-time lookup failed"));
        assert!(msg.contains("Invalid API key"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn peak_hours_error_points_at_file_and_line() {
        let err = TrafficError::PeakHours {
            path: PathBuf::from("/data/part-0000.json"),
            line: 3,
            message: "expected value".to_string(),
        };

        assert_eq!(
            err.to_string(),
            "malformed peak-hours record at /data/part-0000.json:3: expected value"
        );
    }
}
