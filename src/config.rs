use std::fs;
use std::str::FromStr;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::DaybotError;
use crate::runtime_paths;
use crate::Result;

pub const DEFAULT_TIMEZONE: &str = "Europe/Paris";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Directory holding the per-chat JSON stores.
    pub data_dir: Option<String>,
    /// IANA timezone name applied to every chat's wall clock.
    pub timezone: Option<String>,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| DaybotError::Config(format!("cannot read {path}: {e}")))?;
        serde_json::from_str(&raw)
            .map_err(|e| DaybotError::Config(format!("cannot parse {path}: {e}")))
    }

    /// Load the config file when it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if std::path::Path::new(path).exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn data_dir(&self) -> String {
        self.data_dir
            .clone()
            .unwrap_or_else(runtime_paths::default_data_dir)
    }

    pub fn timezone(&self) -> Result<Tz> {
        let name = self.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE);
        Tz::from_str(name).map_err(|e| DaybotError::Config(format!("invalid timezone {name:?}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_without_a_file() {
        let config = Config::default();
        assert_eq!(config.timezone().expect("tz"), chrono_tz::Europe::Paris);
        assert!(!config.data_dir().is_empty());
    }

    #[test]
    fn rejects_unknown_timezone() {
        let config = Config {
            data_dir: None,
            timezone: Some("Mars/OlympusMons".to_string()),
        };
        assert!(config.timezone().is_err());
    }

    #[test]
    fn reads_json_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"data_dir": "/tmp/daybot", "timezone": "Europe/Berlin"}"#)
            .expect("write config");
        let config = Config::from_file(&path.to_string_lossy()).expect("load");
        assert_eq!(config.data_dir(), "/tmp/daybot");
        assert_eq!(config.timezone().expect("tz"), chrono_tz::Europe::Berlin);
    }
}
