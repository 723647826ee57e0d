//! Service configuration, read from an optional `livedit.toml`.

use std::io;
use std::path::Path;

use serde::Deserialize;
use toml::Value as TomlValue;

use crate::config_loader::read_config_from_path;

pub const CONFIG_TOML_FILE: &str = "livedit.toml";

/// Resolved configuration with defaults applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Start a memoized computation again on the next request after it failed
    /// with a fault. When false the fault is cached until the session ends.
    pub retry_failed_computations: bool,

    /// Forward query faults to the configured `FaultReporter`.
    pub report_faults: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retry_failed_computations: true,
            report_faults: true,
        }
    }
}

/// On-disk shape of `livedit.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigToml {
    #[serde(default)]
    pub memoization: MemoizationToml,
    #[serde(default)]
    pub faults: FaultsToml,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoizationToml {
    pub retry_failed: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FaultsToml {
    pub report: Option<bool>,
}

impl From<ConfigToml> for Config {
    fn from(toml: ConfigToml) -> Self {
        let defaults = Config::default();
        Self {
            retry_failed_computations: toml
                .memoization
                .retry_failed
                .unwrap_or(defaults.retry_failed_computations),
            report_faults: toml.faults.report.unwrap_or(defaults.report_faults),
        }
    }
}

impl Config {
    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load_from_path(path: &Path) -> io::Result<Self> {
        let Some(value) = read_config_from_path(path, true)? else {
            return Ok(Self::default());
        };
        Self::from_toml_value(value)
    }

    pub fn from_toml_value(value: TomlValue) -> io::Result<Self> {
        let toml: ConfigToml = value.try_into().map_err(|err| {
            tracing::error!("Invalid configuration: {err}");
            io::Error::new(io::ErrorKind::InvalidData, err)
        })?;
        Ok(toml.into())
    }
}
