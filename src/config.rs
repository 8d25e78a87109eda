//! Application-level configuration loading: cache tunables, board rules, upstream location.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    cache::{CacheSettings, DEFAULT_LOW_WATER_MARK, DEFAULT_TTL},
    generator::models::DEFAULT_LANGUAGE,
    state::{game::Difficulty, session::BoardRules},
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TRIVIA_BACK_CONFIG_PATH";
/// Environment variable that overrides the generation service base URL.
const GENERATION_URL_ENV: &str = "TRIVIA_GENERATION_URL";

const DEFAULT_TIME_LIMIT_SECS: u32 = 60;
const DEFAULT_POINT_VALUES: [u32; 5] = [100, 200, 300, 400, 500];
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_SNAPSHOT_DIR: &str = "data";

#[derive(Debug, Clone, PartialEq)]
/// Immutable runtime configuration shared across the application.
pub struct EngineConfig {
    cache: CacheSettings,
    board: BoardRules,
    starting_difficulty: Difficulty,
    language: String,
    generation_url: Option<String>,
    request_timeout: Duration,
    snapshot_dir: PathBuf,
}

impl EngineConfig {
    /// Load the configuration from disk, falling back to built-in defaults, then apply
    /// environment overrides.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let config = match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        ttl_secs = config.cache.ttl.as_secs(),
                        point_values = ?config.board.point_values,
                        "loaded engine config"
                    );
                    config
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
        };

        match env::var(GENERATION_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => config.with_generation_url(url),
            _ => config,
        }
    }

    /// Parse a JSON configuration document. Missing fields keep their defaults.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Point the generator at another base URL.
    pub fn with_generation_url(mut self, url: impl Into<String>) -> Self {
        self.generation_url = Some(url.into());
        self
    }

    /// Override the snapshot directory.
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = dir.into();
        self
    }

    /// Override the cache tunables.
    pub fn with_cache(mut self, cache: CacheSettings) -> Self {
        self.cache = cache;
        self
    }

    /// Question cache tunables.
    pub fn cache(&self) -> &CacheSettings {
        &self.cache
    }

    /// Board layout and question time limit.
    pub fn board(&self) -> &BoardRules {
        &self.board
    }

    /// Difficulty every board pick and warm-up uses.
    pub fn starting_difficulty(&self) -> Difficulty {
        self.starting_difficulty
    }

    /// Language questions are generated and graded in.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Base URL of the question service, when configured.
    pub fn generation_url(&self) -> Option<&str> {
        self.generation_url.as_deref()
    }

    /// Timeout applied to each question service request.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Directory holding the file snapshot store.
    pub fn snapshot_dir(&self) -> &PathBuf {
        &self.snapshot_dir
    }

    /// Transport settings for the HTTP question service, when a base URL is configured.
    #[cfg(feature = "http-client")]
    pub fn http_service(&self) -> Option<crate::generator::http::HttpServiceConfig> {
        self.generation_url
            .as_ref()
            .map(|base_url| crate::generator::http::HttpServiceConfig {
                base_url: base_url.clone(),
                timeout: self.request_timeout,
            })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    cache_ttl_secs: Option<u64>,
    low_water_mark: Option<usize>,
    sweep_interval_secs: Option<u64>,
    question_time_limit_secs: Option<u32>,
    point_values: Option<Vec<u32>>,
    starting_difficulty: Option<Difficulty>,
    language: Option<String>,
    generation_url: Option<String>,
    request_timeout_secs: Option<u64>,
    snapshot_dir: Option<PathBuf>,
}

impl From<RawConfig> for EngineConfig {
    fn from(value: RawConfig) -> Self {
        let ttl = value
            .cache_ttl_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TTL);
        let cache = CacheSettings {
            ttl,
            low_water_mark: value.low_water_mark.unwrap_or(DEFAULT_LOW_WATER_MARK),
            sweep_interval: value
                .sweep_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(ttl / 2),
        };

        let mut point_values = value
            .point_values
            .filter(|values| !values.is_empty())
            .unwrap_or_else(|| DEFAULT_POINT_VALUES.to_vec());
        point_values.sort_unstable();
        point_values.dedup();

        Self {
            cache,
            board: BoardRules {
                point_values,
                time_limit_secs: value
                    .question_time_limit_secs
                    .filter(|secs| *secs > 0)
                    .unwrap_or(DEFAULT_TIME_LIMIT_SECS),
            },
            starting_difficulty: value.starting_difficulty.unwrap_or(Difficulty::Medium),
            language: value
                .language
                .filter(|language| !language.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            generation_url: value.generation_url.filter(|url| !url.trim().is_empty()),
            request_timeout: value
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            snapshot_dir: value
                .snapshot_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR)),
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
