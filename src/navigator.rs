use std::time::Duration;

use anyhow::{bail, Result};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::browser::{Page, BLOCKED_RESOURCES};
use crate::model::ScrapeOptions;

/// How a listing navigation ended. Never an error: callers decide whether
/// to skip the page or the whole source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavOutcome {
    /// Document loaded and the ready selector appeared.
    Ready,
    /// The site answered with a captcha challenge.
    Blocked,
    /// Every attempt failed.
    Failed,
}

impl NavOutcome {
    pub fn is_ready(self) -> bool {
        self == NavOutcome::Ready
    }
}

/// Load `url` and wait for `ready_selector`, retrying with a linearly
/// growing backoff.
pub async fn navigate(
    page: &dyn Page,
    url: &str,
    ready_selector: &str,
    options: &ScrapeOptions,
) -> NavOutcome {
    if let Err(e) = page.block_resources(BLOCKED_RESOURCES).await {
        warn!("could not install resource filter: {e}");
    }

    let attempts = options.nav_attempts.max(1);
    for attempt in 1..=attempts {
        match try_navigate(page, url, ready_selector, options.timeout()).await {
            Ok(outcome) => return outcome,
            Err(e) if attempt == attempts => {
                warn!("final attempt {attempt}/{attempts} failed for {url}: {e}");
            }
            Err(e) => {
                let backoff = Duration::from_millis(options.retry_backoff_ms * u64::from(attempt));
                info!("attempt {attempt}/{attempts} failed for {url}: {e}; retrying in {backoff:?}");
                sleep(backoff).await;
            }
        }
    }
    NavOutcome::Failed
}

async fn try_navigate(
    page: &dyn Page,
    url: &str,
    ready_selector: &str,
    timeout: Duration,
) -> Result<NavOutcome> {
    page.goto(url, timeout).await?;

    let title = page.title().await.unwrap_or_default();
    if is_captcha_title(&title) {
        warn!("⚠️ captcha challenge served for {url} (title: {title:?})");
        return Ok(NavOutcome::Blocked);
    }

    if let Err(e) = page.wait_for(ready_selector, timeout).await {
        bail!("ready selector `{ready_selector}` missing: {e}");
    }
    Ok(NavOutcome::Ready)
}

fn is_captcha_title(title: &str) -> bool {
    title.to_ascii_lowercase().contains("recaptcha")
}
