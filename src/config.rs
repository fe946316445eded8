use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::model::ScrapeOptions;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value for {name}: {value:?}")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
}

/// Service settings read from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    pub max_pages_cap: u32,
    pub scrape: ScrapeOptions,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = ScrapeOptions::default();
        let headless = match lookup("SCRAPER_HEADLESS") {
            Some(raw) => parse_flag(&raw).ok_or(ConfigError {
                name: "SCRAPER_HEADLESS",
                value: raw,
            })?,
            None => defaults.headless,
        };

        let scrape = ScrapeOptions {
            headless,
            min_wait_ms: read(&lookup, "SCRAPER_MIN_WAIT_MS", defaults.min_wait_ms)?,
            max_wait_ms: read(&lookup, "SCRAPER_MAX_WAIT_MS", defaults.max_wait_ms)?,
            scroll_steps: read(&lookup, "SCRAPER_SCROLL_STEPS", defaults.scroll_steps)?,
            scroll_pause_ms: read(&lookup, "SCRAPER_SCROLL_PAUSE_MS", defaults.scroll_pause_ms)?,
            timeout_ms: read(&lookup, "SCRAPER_TIMEOUT_MS", defaults.timeout_ms)?,
            pdp_concurrency: read(&lookup, "SCRAPER_PDP_CONCURRENCY", defaults.pdp_concurrency)?
                .max(1),
            ..defaults
        };

        Ok(Self {
            port: read(&lookup, "PORT", 3000)?,
            chrome_path: lookup("CHROME_PATH")
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
            headless,
            max_pages_cap: read(&lookup, "SCRAPER_MAX_PAGES_CAP", 10)?.max(1),
            scrape,
        })
    }
}

fn read<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError { name, value: raw }),
    }
}

/// `1`/`true`/`yes` and `0`/`false`/`no`, case-insensitive.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
