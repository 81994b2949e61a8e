//! Configuration file for the command line tool.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{TranslationError, TranslationResult};

/// Name looked up in the working directory.
pub const LOCAL_FILE: &str = "harmonizer.toml";

/// Settings read from `harmonizer.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Default chain for Postgres migrations.
    pub chain: Option<String>,

    /// Path to a JSON schema file.
    pub schema: Option<PathBuf>,

    /// Extra `schema.table = "schema.table"` renames.
    #[serde(default)]
    pub tables: HashMap<String, String>,
}

impl Config {
    pub fn from_toml(text: &str) -> TranslationResult<Self> {
        toml::from_str(text).map_err(|e| TranslationError::Config(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> TranslationResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// `./harmonizer.toml`, else `<config dir>/harmonizer/config.toml`.
    pub fn locate() -> Option<PathBuf> {
        let local = PathBuf::from(LOCAL_FILE);
        if local.is_file() {
            return Some(local);
        }
        let global = dirs::config_dir()?.join("harmonizer").join("config.toml");
        global.is_file().then_some(global)
    }

    /// Load the located file, or defaults when there is none.
    pub fn load() -> TranslationResult<Self> {
        match Self::locate() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::from_path(path)
            }
            None => Ok(Self::default()),
        }
    }
}
