use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_PREFIX: &str = "IMG_";
pub const DEFAULT_MAX_JITTER_SECONDS: u32 = 60;

/// What to use when a file has neither metadata nor an anchored neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackStrategy {
    /// File system modification time, or the fixed epoch if that is unknown
    #[default]
    FileModTime,
    /// Always the configured fixed epoch
    FixedEpoch,
}

/// How output files are nested below the output directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    Flat,
    #[default]
    Year,
    YearMonth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaceMode {
    #[default]
    Copy,
    Move,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_max_jitter() -> u32 {
    DEFAULT_MAX_JITTER_SECONDS
}

fn default_epoch() -> NaiveDateTime {
    // 1970-01-01 00:00:00
    NaiveDateTime::default()
}

/// Settings for sequence-key parsing and timestamp resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveConfig {
    /// Filename prefix that precedes the camera counter, e.g. `IMG_`
    #[serde(default = "default_prefix")]
    pub filename_prefix: String,
    /// Exact width of the counter; `None` accepts any run of digits
    #[serde(default)]
    pub ordinal_digits: Option<usize>,
    /// Upper bound for the offset applied when only one neighbour is known
    #[serde(default = "default_max_jitter")]
    pub max_jitter_seconds: u32,
    #[serde(default)]
    pub fallback: FallbackStrategy,
    #[serde(default = "default_epoch")]
    pub fallback_epoch: NaiveDateTime,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            filename_prefix: default_prefix(),
            ordinal_digits: None,
            max_jitter_seconds: default_max_jitter(),
            fallback: FallbackStrategy::default(),
            fallback_epoch: default_epoch(),
        }
    }
}

impl ResolveConfig {
    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)?;
        let config: ResolveConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.filename_prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        if self.filename_prefix.contains(['/', '\\']) {
            return Err(ConfigError::PrefixWithSeparator(self.filename_prefix.clone()));
        }
        if self.ordinal_digits == Some(0) {
            return Err(ConfigError::ZeroOrdinalDigits);
        }
        Ok(())
    }
}
