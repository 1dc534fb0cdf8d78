//! Reader for the peak-hour analytics written by the offline batch job.
//!
//! Each `*.json` file in the directory holds one JSON object per line with at
//! least an `avg_volume` number; every other field is kept as-is.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::AnalyticsConfig;
use crate::error::{Result, TrafficError};

/// How many records the ranking returns.
pub const TOP_PEAK_HOURS: usize = 6;

/// What to do with a line that is not a valid record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedLinePolicy {
    /// Abort the whole read.
    #[default]
    Fail,
    /// Log and carry on with the next line.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakHourRecord {
    pub avg_volume: f64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl PeakHourRecord {
    pub fn hour(&self) -> Option<i64> {
        self.fields.get("hour").and_then(Value::as_i64)
    }
}

#[derive(Debug, Clone)]
pub struct PeakHoursReader {
    dir: PathBuf,
    policy: MalformedLinePolicy,
}

impl PeakHoursReader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            policy: MalformedLinePolicy::default(),
        }
    }

    pub fn from_config(config: &AnalyticsConfig) -> Self {
        Self::new(&config.peak_hours_dir).with_policy(config.malformed_lines)
    }

    pub fn with_policy(mut self, policy: MalformedLinePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Top records by descending `avg_volume`. A missing directory yields an
    /// empty list; ties keep file and line order.
    pub fn top(&self) -> Result<Vec<PeakHourRecord>> {
        let mut records = self.read_all()?;
        records.sort_by(|a, b| b.avg_volume.total_cmp(&a.avg_volume));
        records.truncate(TOP_PEAK_HOURS);
        Ok(records)
    }

    /// Every record in the directory, in sorted file order.
    pub fn read_all(&self) -> Result<Vec<PeakHourRecord>> {
        if !self.dir.exists() {
            debug!(dir = %self.dir.display(), "peak-hours directory does not exist");
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for file in self.json_files()? {
            self.read_file(&file, &mut records)?;
        }
        Ok(records)
    }

    fn json_files(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| TrafficError::io(&self.dir, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| TrafficError::io(&self.dir, e))?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn read_file(&self, path: &Path, records: &mut Vec<PeakHourRecord>) -> Result<()> {
        let contents = fs::read_to_string(path).map_err(|e| TrafficError::io(path, e))?;

        for (idx, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<PeakHourRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => match self.policy {
                    MalformedLinePolicy::Fail => {
                        return Err(TrafficError::PeakHours {
                            path: path.to_path_buf(),
                            line: idx + 1,
                            message: e.to_string(),
                        });
                    }
                    MalformedLinePolicy::Skip => {
                        warn!(
                            file = %path.display(),
                            line = idx + 1,
                            error = %e,
                            "skipping malformed peak-hours record"
                        );
                    }
                },
            }
        }
        Ok(())
    }
}
