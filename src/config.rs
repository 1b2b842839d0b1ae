use crate::audio::MAX_FILE_SIZE_BYTES;
use crate::cue::{DEFAULT_SECONDS_PER_CUE, MAX_SECONDS_PER_CUE};
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_NAME: &str = "whisper-captions";
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/audio/transcriptions";
pub const DEFAULT_MODEL: &str = "whisper-1";

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub endpoint: String,
    pub model: String,
    pub seconds_per_cue: f64,
    pub max_file_size_bytes: u64,
    pub request_timeout_secs: u64,
    pub tick_interval_ms: u64,
    pub cache: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: String::from(DEFAULT_ENDPOINT),
            model: String::from(DEFAULT_MODEL),
            seconds_per_cue: DEFAULT_SECONDS_PER_CUE,
            max_file_size_bytes: MAX_FILE_SIZE_BYTES,
            request_timeout_secs: 600,
            tick_interval_ms: 1000,
            cache: true,
        }
    }
}

impl Config {
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(s).context("parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path`, or the default location if none is given.
    ///
    /// Only a missing file at the default location falls back to defaults.
    pub async fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match default_config_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };
        if !explicit && !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            log::debug!("no config at '{}', using defaults", path.display());
            return Ok(Self::default());
        }
        let config = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("read config from '{}'", path.display()))?;
        Self::from_toml(&config).with_context(|| format!("in '{}'", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.seconds_per_cue.is_finite() && self.seconds_per_cue >= 0.001,
            "seconds_per_cue must be a positive number of seconds (at least 0.001), got {}",
            self.seconds_per_cue
        );
        anyhow::ensure!(
            self.seconds_per_cue <= MAX_SECONDS_PER_CUE,
            "seconds_per_cue must be at most {MAX_SECONDS_PER_CUE}, got {}",
            self.seconds_per_cue
        );
        anyhow::ensure!(self.tick_interval_ms > 0, "tick_interval_ms must be positive");
        anyhow::ensure!(
            self.request_timeout_secs > 0,
            "request_timeout_secs must be positive"
        );
        anyhow::ensure!(
            self.max_file_size_bytes > 0,
            "max_file_size_bytes must be positive"
        );
        anyhow::ensure!(!self.model.trim().is_empty(), "model must not be empty");
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.toml"))
}

pub fn credentials_path() -> anyhow::Result<PathBuf> {
    let dir = dirs::data_dir().context("Unable to determine user data directory")?;
    Ok(dir.join(APP_NAME).join("credentials.json"))
}

pub fn cache_dir() -> anyhow::Result<PathBuf> {
    let dir = dirs::cache_dir().context("Unable to determine user cache directory")?;
    Ok(dir.join(APP_NAME))
}
