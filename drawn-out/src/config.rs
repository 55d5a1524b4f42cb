//! Runtime configuration.
//!
//! Connection targets and paths come from the environment (a `.env` file is
//! loaded first when present). Pipeline tunables have defaults matching the
//! weekly blitz tournament format.

use std::path::PathBuf;
use std::time::Duration;

use chesscom_extractor::{BrowserSettings, DEFAULT_HOST};
use tracing::warn;

use crate::{Error, Result};

pub const DEFAULT_DB_URI: &str = "sqlite:data/scraped.db?mode=rwc";
pub const DEFAULT_BROWSER_URI: &str = "http://localhost:9222";
pub const DEFAULT_MAX_TABS: usize = 11;

/// Pipeline tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Rounds in the tournament format.
    pub total_rounds: u32,
    /// Games selected per fetch batch.
    pub batch_size: u32,
    /// Attempts per game within one batch pass.
    pub local_max_retries: u32,
    /// Durable failures after which a game is never selected again.
    pub max_retries: u32,
    /// Rounds that must be discovered before a job may complete.
    pub min_rounds_for_completion: u32,
    /// Local backoff is `backoff_base * 2^attempts`.
    pub backoff_base: Duration,
    /// Consecutive aborted population passes on one job before the run stops.
    pub max_population_failures: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            total_rounds: 11,
            batch_size: 50,
            local_max_retries: 3,
            max_retries: 3,
            min_rounds_for_completion: 4,
            backoff_base: Duration::from_secs(1),
            max_population_failures: 3,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.total_rounds == 0 {
            return Err(Error::config("total_rounds must be at least 1"));
        }
        if self.min_rounds_for_completion > self.total_rounds {
            return Err(Error::config(format!(
                "min_rounds_for_completion ({}) exceeds total_rounds ({})",
                self.min_rounds_for_completion, self.total_rounds
            )));
        }
        if self.batch_size == 0 || self.local_max_retries == 0 || self.max_retries == 0 {
            return Err(Error::config(
                "batch_size, local_max_retries and max_retries must be positive",
            ));
        }
        Ok(())
    }
}

/// Environment-derived application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_uri: String,
    pub db_token: Option<String>,
    pub browser_uri: String,
    pub max_tabs: usize,
    /// Launch a local, visible browser instead of connecting to `browser_uri`.
    pub debug: bool,
    pub screenshot_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub chess_host: String,
    pub browser: BrowserSettings,
    pub pipeline: PipelineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_uri: DEFAULT_DB_URI.to_string(),
            db_token: None,
            browser_uri: DEFAULT_BROWSER_URI.to_string(),
            max_tabs: DEFAULT_MAX_TABS,
            debug: false,
            screenshot_path: None,
            log_dir: None,
            chess_host: DEFAULT_HOST.to_string(),
            browser: BrowserSettings::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load `.env` (if any) and read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let max_tabs = match get("MAX_TABS") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or_else(|| Error::config(format!("MAX_TABS must be a positive integer, got {raw:?}")))?,
            None => defaults.max_tabs,
        };

        let debug = get("DEBUG")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let db_token = get("DB_TOKEN");
        if db_token.is_some() {
            warn!("DB_TOKEN is set but the SQLite store does not use authentication; ignoring it");
        }

        Ok(Self {
            db_uri: get("DB_URI").unwrap_or(defaults.db_uri),
            db_token,
            browser_uri: get("BROWSER_URI")
                .or_else(|| get("PLAYWRIGHT_URI"))
                .unwrap_or(defaults.browser_uri),
            max_tabs,
            debug,
            screenshot_path: get("SCREENSHOT_PATH").map(PathBuf::from),
            log_dir: get("LOG_DIR").map(PathBuf::from),
            chess_host: get("CHESS_HOST").unwrap_or(defaults.chess_host),
            browser: defaults.browser,
            pipeline: defaults.pipeline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.db_uri, DEFAULT_DB_URI);
        assert_eq!(config.browser_uri, DEFAULT_BROWSER_URI);
        assert_eq!(config.max_tabs, 11);
        assert!(!config.debug);
        assert!(config.screenshot_path.is_none());
        assert_eq!(config.pipeline, PipelineConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DB_URI", "sqlite:/tmp/x.db"),
            ("PLAYWRIGHT_URI", "ws://browser:3000"),
            ("MAX_TABS", "4"),
            ("DEBUG", "1"),
            ("SCREENSHOT_PATH", "shots"),
            ("LOG_DIR", ""),
        ]))
        .unwrap();

        assert_eq!(config.db_uri, "sqlite:/tmp/x.db");
        assert_eq!(config.browser_uri, "ws://browser:3000");
        assert_eq!(config.max_tabs, 4);
        assert!(config.debug);
        assert_eq!(config.screenshot_path, Some(PathBuf::from("shots")));
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn test_browser_uri_wins_over_fallback() {
        let config = AppConfig::from_lookup(lookup(&[
            ("BROWSER_URI", "http://a:9222"),
            ("PLAYWRIGHT_URI", "http://b:9222"),
        ]))
        .unwrap();
        assert_eq!(config.browser_uri, "http://a:9222");
    }

    #[test]
    fn test_pipeline_validation() {
        assert!(PipelineConfig::default().validate().is_ok());

        let config = PipelineConfig {
            min_rounds_for_completion: 12,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_max_tabs() {
        assert!(matches!(
            AppConfig::from_lookup(lookup(&[("MAX_TABS", "0")])),
            Err(Error::Configuration(_))
        ));
        assert!(AppConfig::from_lookup(lookup(&[("MAX_TABS", "many")])).is_err());
    }
}
