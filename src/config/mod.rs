use anyhow::{Context, Result};
use camino::Utf8Path;
use serde::Deserialize;
use std::fs;

pub const DEFAULT_CONFIG_PATH: &str = "gpstag.yaml";

/// How the displayed time gap treats the hour shift.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapAccounting {
    /// Unshifted gap minus the engine shift (historic behavior).
    #[default]
    Double,
    /// Residual gap after the shift has been applied to the track.
    Single,
}

/// Frame used to turn epoch milliseconds into naive wall-clock time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpochFrame {
    #[default]
    Local,
    Utc,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub exiftool: String,
    pub exiftool_args: Vec<String>,
    pub gap_accounting: GapAccounting,
    pub epoch_frame: EpochFrame,
    pub max_gap_hours: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exiftool: "exiftool".to_string(),
            exiftool_args: vec!["-m".to_string()],
            gap_accounting: GapAccounting::default(),
            epoch_frame: EpochFrame::default(),
            max_gap_hours: None,
        }
    }
}

impl Config {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).with_context(|| "Failed to parse configuration")
    }

    /// Loads `path` if given, otherwise the default file when present, otherwise defaults.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p, true),
            None => (Utf8Path::new(DEFAULT_CONFIG_PATH), false),
        };

        if !required && !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_yaml(&content)
    }
}
