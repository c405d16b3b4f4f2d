//! Runtime configuration.
//!
//! Defaults cover every field; [`Config::from_env`] overlays the `REMOVD_*`
//! environment variables on top of them.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use removd_core::{ProbeSettings, ShrinkOptions};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default transform endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.remove.bg/v1.0/removebg";

/// Environment variable holding the API key.
pub const API_KEY_VAR: &str = "REMOVD_API_KEY";

/// removd configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Items resolved concurrently per batch window.
    pub concurrency: usize,
    pub probe: ProbeSettings,
    pub shrink: ShrinkOptions,
    /// Where results of URL and buffer sources go when no destination is
    /// given.
    pub output_dir: PathBuf,
    pub endpoint: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            probe: ProbeSettings::default(),
            shrink: ShrinkOptions::default(),
            output_dir: PathBuf::from("."),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{name} has an invalid value: {value:?}")))
}

impl Config {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("REMOVD_BATCH_LIMIT") {
            config.concurrency = parse_var("REMOVD_BATCH_LIMIT", &v)?;
        }
        if let Some(v) = lookup("REMOVD_PROBE_MULTIPLIER") {
            config.probe.initial_multiplier = parse_var("REMOVD_PROBE_MULTIPLIER", &v)?;
        }
        if let Some(v) = lookup("REMOVD_PROBE_ATTEMPTS") {
            config.probe.max_attempts = parse_var("REMOVD_PROBE_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("REMOVD_BYTE_CEILING") {
            config.shrink.byte_ceiling = parse_var("REMOVD_BYTE_CEILING", &v)?;
        }
        if let Some(v) = lookup("REMOVD_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("REMOVD_ENDPOINT") {
            config.endpoint = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::config("concurrency must be at least 1"));
        }
        if self.probe.max_attempts == 0 {
            return Err(Error::config("probe attempts must be at least 1"));
        }
        if self.probe.initial_multiplier == 0 {
            return Err(Error::config("probe multiplier must be at least 1"));
        }
        if self.shrink.byte_ceiling == 0 {
            return Err(Error::config("byte ceiling must be non-zero"));
        }
        Ok(())
    }
}

/// Transform service API key. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// `REMOVD_API_KEY` when set and non-empty, else `explicit`.
    pub fn from_env_or(explicit: Option<&str>) -> Option<Self> {
        Self::resolve(std::env::var(API_KEY_VAR).ok(), explicit)
    }

    fn resolve(env: Option<String>, explicit: Option<&str>) -> Option<Self> {
        env.filter(|k| !k.trim().is_empty())
            .or_else(|| explicit.map(str::to_string))
            .map(Self)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}
