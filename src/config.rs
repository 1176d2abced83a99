use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Store configuration, persisted as TOML next to the data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory the key-value engine lives in. Created on open.
    pub data_dir: PathBuf,
    /// Verify event signatures before insertion.
    #[serde(default = "default_verify_events")]
    pub verify_events: bool,
    /// Mirror logs into this directory in addition to stdout.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_verify_events() -> bool {
    true
}

impl Config {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            verify_events: default_verify_events(),
            log_dir: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn load_or_default(path: &Path, data_dir: impl Into<PathBuf>) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::new(data_dir);
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}
