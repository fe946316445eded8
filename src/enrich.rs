//! Detail-page price enrichment.
//!
//! Each selected row gets exactly one task that opens its own context,
//! loads the product page once and back-fills whatever price fields the
//! listing left empty. Tasks run under a semaphore so no more than
//! `pdp_concurrency` product pages are open at any moment. A failed visit
//! leaves the row as it was.

use anyhow::Result;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::browser::{Browser, Page, PageProfile};
use crate::extract::{parse_pdp, PdpPrices};
use crate::jitter::Jitter;
use crate::model::{Platform, ProductRecord, ScrapeOptions};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichStats {
    pub targets: usize,
    pub visited: usize,
    pub filled: usize,
}

/// Rows that need a detail-page visit.
pub fn needs_visit(row: &ProductRecord, force: bool) -> bool {
    row.product_url.is_some() && (force || row.price.is_none())
}

pub async fn enrich_rows(
    browser: &dyn Browser,
    rows: &mut [ProductRecord],
    options: &ScrapeOptions,
    jitter: &Jitter,
) -> EnrichStats {
    let semaphore = Semaphore::new(options.pdp_concurrency.max(1));
    let semaphore = &semaphore;
    let force = options.pdp_prices;

    let tasks = rows
        .iter_mut()
        .filter(|row| needs_visit(row, force))
        .map(move |row| async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return (false, false);
            };
            let Some(url) = row.product_url.clone() else {
                return (false, false);
            };
            match visit(browser, &url, options, jitter).await {
                Ok(prices) => (true, row.backfill(prices.price, prices.mrp)),
                Err(e) => {
                    debug!("pdp visit failed for {url}: {e}");
                    (false, false)
                }
            }
        });

    let results = join_all(tasks).await;
    let stats = EnrichStats {
        targets: results.len(),
        visited: results.iter().filter(|(visited, _)| *visited).count(),
        filled: results.iter().filter(|(_, filled)| *filled).count(),
    };
    if stats.targets > 0 {
        info!(
            "pdp enrichment: {} targets, {} visited, {} filled",
            stats.targets, stats.visited, stats.filled
        );
    }
    stats
}

async fn visit(
    browser: &dyn Browser,
    url: &str,
    options: &ScrapeOptions,
    jitter: &Jitter,
) -> Result<PdpPrices> {
    let profile = PageProfile {
        user_agent: jitter.user_agent(&options.user_agents),
        viewport: options.pdp_viewport,
        locale: options.locale.clone(),
    };
    let page = browser.open_page(&profile).await?;
    let result = read_prices(page.as_ref(), url, options, jitter).await;
    if let Err(e) = page.close().await {
        debug!("closing pdp context failed: {e}");
    }
    result
}

async fn read_prices(
    page: &dyn Page,
    url: &str,
    options: &ScrapeOptions,
    jitter: &Jitter,
) -> Result<PdpPrices> {
    page.goto(url, options.timeout()).await?;
    sleep(jitter.wait(options.min_wait_ms, options.max_wait_ms)).await;
    let html = page.content().await?;
    Ok(parse_pdp(Platform::detect(url), &html))
}
