use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::join_all;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::browser::{Browser, BrowserLauncher};
use crate::crawler::crawl_source;
use crate::enrich::enrich_rows;
use crate::jitter::Jitter;
use crate::model::{
    CaptchaFlags, Platform, ProductRecord, ScrapeOptions, ScrapeOutcome, ScrapeRequest,
    SourceConfig,
};

/// Runs complete scrapes: one browser per run, every source crawled
/// concurrently, PDP enrichment, then de-duplication.
pub struct Scraper {
    launcher: Arc<dyn BrowserLauncher>,
    options: ScrapeOptions,
    jitter: Jitter,
}

impl Scraper {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, options: ScrapeOptions) -> Self {
        Self {
            launcher,
            options,
            jitter: Jitter::from_entropy(),
        }
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub async fn scrape(&self, request: &ScrapeRequest) -> Result<ScrapeOutcome> {
        let options = ScrapeOptions {
            pdp_prices: request.pdp_prices,
            ..self.options.clone()
        };
        let run_id = Uuid::new_v4();
        self.run(&request.sources(), &options)
            .instrument(tracing::info_span!("scrape", %run_id))
            .await
    }

    /// Scrape `sources`. The browser is closed on every path out of here.
    pub async fn run(&self, sources: &[SourceConfig], options: &ScrapeOptions) -> Result<ScrapeOutcome> {
        if sources.is_empty() {
            return Ok(ScrapeOutcome::default());
        }
        info!(
            "🚀 scraping {} source(s), max_pages={}, pdp_prices={}",
            sources.len(),
            sources.iter().map(|s| s.max_pages).max().unwrap_or(1),
            options.pdp_prices
        );

        let browser = self
            .launcher
            .launch()
            .await
            .context("failed to launch browser")?;

        let outcome = self.run_with(browser.as_ref(), sources, options).await;

        if let Err(e) = browser.close().await {
            warn!("browser close failed: {e}");
        }
        outcome
    }

    async fn run_with(
        &self,
        browser: &dyn Browser,
        sources: &[SourceConfig],
        options: &ScrapeOptions,
    ) -> Result<ScrapeOutcome> {
        let crawls = sources
            .iter()
            .map(|source| crawl_source(browser, source, options, &self.jitter));
        let reports = join_all(crawls).await;

        let mut rows = Vec::new();
        let mut captcha = CaptchaFlags::default();
        for (source, report) in sources.iter().zip(reports) {
            let report = report?;
            if report.captcha {
                captcha.mark(source.platform);
            }
            info!(
                "[{}] {} rows from {} page(s), {} skipped",
                source.platform,
                report.rows.len(),
                report.pages_loaded,
                report.pages_skipped
            );
            rows.extend(report.rows);
        }

        enrich_rows(browser, &mut rows, options, &self.jitter).await;

        let total = rows.len();
        let rows = dedupe(rows);
        info!("✅ {} unique rows ({} duplicates dropped)", rows.len(), total - rows.len());
        Ok(ScrapeOutcome { rows, captcha })
    }
}

/// Keep the first row for every `(platform, product_url)` pair.
pub fn dedupe(rows: Vec<ProductRecord>) -> Vec<ProductRecord> {
    let mut seen: HashSet<(Platform, Option<String>)> = HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert((row.platform, row.product_url.clone())))
        .collect()
}
