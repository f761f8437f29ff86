//! Application-level configuration loading, including the seeded image list.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::{bracket::SEED_COUNT, clock::CHECKPOINTS};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "BRACKET_BACK_CONFIG_PATH";

const DEFAULT_PERIOD_SEC: u32 = 300;
const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_BRACKET_CACHE_CAPACITY: usize = 512;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    period_sec: u32,
    store_timeout: Duration,
    bracket_cache_capacity: usize,
    seeds: Vec<String>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        period_sec = app_config.period_sec,
                        seeds = app_config.seeds.len(),
                        "loaded tournament config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Override the period, used by tests that need short cycles.
    pub fn with_period_sec(mut self, period_sec: u32) -> Self {
        self.period_sec = period_sec.max(u32::from(CHECKPOINTS));
        self
    }

    /// Length of one full cycle in seconds, used when the clock row is first created.
    pub fn period_sec(&self) -> u32 {
        self.period_sec
    }

    /// Upper bound applied to every store call.
    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    /// Maximum number of memoized bracket survivors.
    pub fn bracket_cache_capacity(&self) -> usize {
        self.bracket_cache_capacity
    }

    /// Image paths of the round-of-32 entrants, two per first-round slot.
    pub fn seeds(&self) -> &[String] {
        &self.seeds
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            period_sec: DEFAULT_PERIOD_SEC,
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            bracket_cache_capacity: DEFAULT_BRACKET_CACHE_CAPACITY,
            seeds: default_seeds(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    period_sec: Option<u32>,
    store_timeout_ms: Option<u64>,
    bracket_cache_capacity: Option<usize>,
    seeds: Option<Vec<String>>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let period_sec = match value.period_sec {
            Some(period) if period >= u32::from(CHECKPOINTS) => period,
            Some(period) => {
                warn!(
                    period_sec = period,
                    "period_sec must cover one second per round; using default"
                );
                DEFAULT_PERIOD_SEC
            }
            None => DEFAULT_PERIOD_SEC,
        };

        let seeds = match value.seeds {
            Some(seeds) if seeds.len() == SEED_COUNT => seeds,
            Some(seeds) => {
                warn!(
                    count = seeds.len(),
                    expected = SEED_COUNT,
                    "wrong number of seeds; using default images"
                );
                default_seeds()
            }
            None => default_seeds(),
        };

        let store_timeout_ms = value
            .store_timeout_ms
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_STORE_TIMEOUT_MS);

        Self {
            period_sec,
            store_timeout: Duration::from_millis(store_timeout_ms),
            bracket_cache_capacity: value
                .bracket_cache_capacity
                .unwrap_or(DEFAULT_BRACKET_CACHE_CAPACITY),
            seeds,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in seed images shipped alongside the frontend.
fn default_seeds() -> Vec<String> {
    (1..=SEED_COUNT).map(|n| format!("img/{n:02}.png")).collect()
}
