use std::{io, path::PathBuf, str::Utf8Error};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {error}")]
    FileRead { error: io::Error },

    #[error("Config file is not valid UTF-8: {error}")]
    FileParse { error: Utf8Error },

    #[error("Failed to parse config JSON: {error}")]
    JsonParse { error: serde_json::Error },
}

fn default_max_via_ways() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectionConfig {
    /// Search radius around the starting vertex; unbounded when absent.
    #[serde(default)]
    pub max_distance_m: Option<f64>,

    #[serde(default = "default_max_via_ways")]
    pub max_via_ways: usize,

    /// Highway classes treated as routable; any non-empty `highway` value when absent.
    #[serde(default)]
    pub highway: Option<Vec<String>>,
}

impl Default for IntersectionConfig {
    fn default() -> Self {
        Self {
            max_distance_m: None,
            max_via_ways: default_max_via_ways(),
            highway: None,
        }
    }
}

impl IntersectionConfig {
    pub fn max_distance(&self) -> f64 {
        self.max_distance_m.unwrap_or(f64::INFINITY)
    }

    pub fn is_routable_highway(&self, highway: &str) -> bool {
        match &self.highway {
            None => true,
            Some(classes) => classes.iter().any(|class| class == highway),
        }
    }

    #[tracing::instrument]
    pub fn read_from_file(file: PathBuf) -> Result<Self, ConfigError> {
        let file = std::fs::read(file).map_err(|error| ConfigError::FileRead { error })?;
        let text =
            std::str::from_utf8(&file[..]).map_err(|error| ConfigError::FileParse { error })?;
        Self::from_json(text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|error| ConfigError::JsonParse { error })
    }

    pub fn read(file: Option<PathBuf>) -> Result<Self, ConfigError> {
        match file {
            None => Ok(Self::default()),
            Some(file) => Self::read_from_file(file),
        }
    }
}
