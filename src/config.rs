use std::{
    env, fs,
    path::{Path, PathBuf},
};

use log::{info, warn};
use serde::{Deserialize, Serialize};

pub const DATA_DIR_ENV: &str = "APTVOTE_DATA_DIR";
pub const DEBUG_ENV: &str = "APTVOTE_DEBUG";
const DEFAULT_DATA_DIR: &str = ".aptvote";
const CONFIG_FILE: &str = "config.json";

/// Optional overrides read from `config.json` in the data directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
struct FileConfig {
    database_file: String,
    session_file: String,
    verbose: bool,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            database_file: "aptvote.sqlite3".into(),
            session_file: "session.json".into(),
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub database_file: String,
    pub session_file: String,
    pub verbose: bool,
}

impl AppConfig {
    /// Resolve the data directory from the environment, then read its
    /// `config.json` if there is one.
    pub fn load() -> Self {
        let data_dir = env::var(DATA_DIR_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                info!("{DATA_DIR_ENV} not set, using default: {DEFAULT_DATA_DIR}");
                PathBuf::from(DEFAULT_DATA_DIR)
            });

        let mut config = Self::from_dir(data_dir);
        if env::var(DEBUG_ENV).is_ok_and(|value| value == "1") {
            config.verbose = true;
        }
        config
    }

    pub fn from_dir(data_dir: PathBuf) -> Self {
        let file = read_file_config(&data_dir.join(CONFIG_FILE));
        Self {
            data_dir,
            database_file: file.database_file,
            session_file: file.session_file,
            verbose: file.verbose,
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join(&self.session_file)
    }
}

fn read_file_config(path: &Path) -> FileConfig {
    if !path.exists() {
        return FileConfig::default();
    }

    let parsed = fs::read_to_string(path)
        .map_err(|err| err.to_string())
        .and_then(|contents| serde_json::from_str(&contents).map_err(|err| err.to_string()));

    match parsed {
        Ok(config) => config,
        Err(err) => {
            warn!("Ignoring {}: {err}; using defaults", path.display());
            FileConfig::default()
        }
    }
}
