//! User configuration file and default locations.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{
    rating::{MatchmakingParams, RatingParams},
    runtime::RuntimeConfig,
    session::SessionSettings,
    triage::Destinations,
};

const APP_DIR: &str = "shortlist";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parsing {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("encoding config: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Settings persisted between runs. Missing fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source_folders: Vec<PathBuf>,
    pub accepted_folder: PathBuf,
    pub rejected_folder: PathBuf,
    pub rating: RatingParams,
    pub matchmaking: MatchmakingParams,
    pub runtime: RuntimeConfig,
}

impl Config {
    /// Per-user config directory, falling back to the working directory.
    pub fn default_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    pub fn default_path() -> PathBuf {
        Self::default_dir().join("config.json")
    }

    /// Where the session journal lives by default.
    pub fn default_journal_path() -> PathBuf {
        Self::default_dir().join("session.db")
    }

    /// Reads `path`, or returns defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(?path, "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes pretty JSON to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(io_err)
    }

    /// True once a source folder and both destinations are set.
    pub fn is_valid(&self) -> bool {
        !self.source_folders.is_empty()
            && !self.accepted_folder.as_os_str().is_empty()
            && !self.rejected_folder.as_os_str().is_empty()
    }

    pub fn destinations(&self) -> Destinations {
        Destinations::new(&self.accepted_folder, &self.rejected_folder)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            destinations: self.destinations(),
            rating: self.rating.clone(),
            matchmaking: self.matchmaking.clone(),
        }
    }
}
