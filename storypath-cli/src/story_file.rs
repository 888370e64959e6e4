use std::path::{Path, PathBuf};

use storypath_core::{DataError, SimulationConfig, StoryData, StorySource};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoryFileError {
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}")]
    Data {
        path: String,
        #[source]
        source: DataError,
    },
}

/// Story export stored as a JSON file on disk.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StorySource for JsonFileSource {
    type Error = StoryFileError;

    fn load_story(&self) -> Result<StoryData, Self::Error> {
        let path = self.path.display().to_string();
        let json = std::fs::read_to_string(&self.path).map_err(|source| StoryFileError::Io {
            path: path.clone(),
            source,
        })?;
        StoryData::from_json(&json).map_err(|source| StoryFileError::Data { path, source })
    }
}

/// Load a base simulation config from a JSON file.
pub fn load_config_file(path: &Path) -> anyhow::Result<SimulationConfig> {
    use anyhow::Context;

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("invalid config {}", path.display()))
}
