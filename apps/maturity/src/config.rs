//! # Application Configuration
//!
//! Three layers, later ones win:
//!
//! 1. `maturity.toml` (or the file named by `--config`)
//! 2. `MATURITY_*` environment variables
//! 3. explicit command-line flags

use maturity_core::MaturityError;
use maturity_core::primitives::{DEFAULT_STORAGE_TIMEOUT_MS, SESSION_TTL_HOURS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file read when `--config` is not given and the file exists.
pub const DEFAULT_CONFIG_FILE: &str = "maturity.toml";

pub const ENV_DATABASE: &str = "MATURITY_DATABASE";
pub const ENV_QUESTIONS: &str = "MATURITY_QUESTIONS";
pub const ENV_ADVICE: &str = "MATURITY_ADVICE";
pub const ENV_SESSION_TTL_HOURS: &str = "MATURITY_SESSION_TTL_HOURS";
pub const ENV_STORAGE_TIMEOUT_MS: &str = "MATURITY_STORAGE_TIMEOUT_MS";
pub const ENV_LOG_FORMAT: &str = "MATURITY_LOG_FORMAT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// redb database file.
    pub database: PathBuf,
    /// Question catalog JSON.
    pub questions: PathBuf,
    /// Advice catalog JSON.
    pub advice: PathBuf,
    pub session_ttl_hours: i64,
    pub storage_timeout_ms: u64,
    /// `text` or `json`.
    pub log_format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("maturity.redb"),
            questions: PathBuf::from("configs/questions.json"),
            advice: PathBuf::from("configs/advice.json"),
            session_ttl_hours: SESSION_TTL_HOURS,
            storage_timeout_ms: DEFAULT_STORAGE_TIMEOUT_MS,
            log_format: "text".to_string(),
        }
    }
}

/// Values given on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database: Option<PathBuf>,
    pub questions: Option<PathBuf>,
    pub advice: Option<PathBuf>,
}

impl AppConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml(text: &str) -> Result<Self, MaturityError> {
        toml::from_str(text).map_err(|e| MaturityError::Config(e.to_string()))
    }

    /// Read the file layer.
    ///
    /// An explicit path must exist. Without one, `maturity.toml` in the
    /// working directory is used when present, defaults otherwise.
    pub fn from_file(path: Option<&Path>) -> Result<Self, MaturityError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    return Ok(Self::default());
                }
                fallback
            }
        };
        let text = std::fs::read_to_string(&path)
            .map_err(|e| MaturityError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    /// Apply environment overrides through a lookup function.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), MaturityError> {
        if let Some(v) = lookup(ENV_DATABASE) {
            self.database = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_QUESTIONS) {
            self.questions = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_ADVICE) {
            self.advice = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_SESSION_TTL_HOURS) {
            self.session_ttl_hours = parse_env(ENV_SESSION_TTL_HOURS, &v)?;
        }
        if let Some(v) = lookup(ENV_STORAGE_TIMEOUT_MS) {
            self.storage_timeout_ms = parse_env(ENV_STORAGE_TIMEOUT_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_LOG_FORMAT) {
            self.log_format = v;
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(p) = &overrides.database {
            self.database = p.clone();
        }
        if let Some(p) = &overrides.questions {
            self.questions = p.clone();
        }
        if let Some(p) = &overrides.advice {
            self.advice = p.clone();
        }
    }

    pub fn validate(&self) -> Result<(), MaturityError> {
        if self.session_ttl_hours <= 0 {
            return Err(MaturityError::Config(
                "session_ttl_hours must be positive".to_string(),
            ));
        }
        if self.storage_timeout_ms == 0 {
            return Err(MaturityError::Config(
                "storage_timeout_ms must be positive".to_string(),
            ));
        }
        if !matches!(self.log_format.as_str(), "text" | "json") {
            return Err(MaturityError::Config(format!(
                "unknown log_format '{}'",
                self.log_format
            )));
        }
        Ok(())
    }

    /// All three layers, validated.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self, MaturityError> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours)
    }

    #[must_use]
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, MaturityError> {
    value
        .trim()
        .parse()
        .map_err(|_| MaturityError::Config(format!("{key}: invalid value '{value}'")))
}

// =============================================================================
// TESTS
// =============================================================================
