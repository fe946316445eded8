use anyhow::{Context, Result};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::browser::{auto_scroll, Browser, Page, PageProfile};
use crate::extract::{amazon, flipkart};
use crate::jitter::Jitter;
use crate::model::{Platform, ProductRecord, ScrapeOptions, SourceConfig};
use crate::navigator::{navigate, NavOutcome};
use crate::normalize::page_url;

/// What one source's paginated run produced.
#[derive(Debug, Clone, Default)]
pub struct SourceReport {
    pub rows: Vec<ProductRecord>,
    pub pages_loaded: u32,
    pub pages_skipped: u32,
    pub captcha: bool,
}

/// Crawl every listing page of `source` in order inside one isolated
/// context. Pages that fail to load are skipped; a captcha ends the source.
/// Only failing to open the context is an error.
pub async fn crawl_source(
    browser: &dyn Browser,
    source: &SourceConfig,
    options: &ScrapeOptions,
    jitter: &Jitter,
) -> Result<SourceReport> {
    let profile = PageProfile {
        user_agent: jitter.user_agent(&options.user_agents),
        viewport: options.list_viewport,
        locale: options.locale.clone(),
    };
    let page = browser
        .open_page(&profile)
        .await
        .with_context(|| format!("failed to open a {} browsing context", source.platform))?;

    let report = crawl_pages(page.as_ref(), source, options, jitter).await;

    if let Err(e) = page.close().await {
        warn!("[{}] closing context failed: {e}", source.platform);
    }
    Ok(report)
}

async fn crawl_pages(
    page: &dyn Page,
    source: &SourceConfig,
    options: &ScrapeOptions,
    jitter: &Jitter,
) -> SourceReport {
    let mut report = SourceReport::default();
    let mut position = 0;

    for page_no in 1..=source.max_pages {
        let url = page_url(&source.url, page_no);
        info!("[{}] listing page {page_no}: {url}", source.platform);

        match navigate(page, &url, source.platform.ready_selector(), options).await {
            NavOutcome::Ready => {}
            NavOutcome::Blocked => {
                report.captcha = true;
                report.pages_skipped += source.max_pages - page_no + 1;
                break;
            }
            NavOutcome::Failed => {
                report.pages_skipped += 1;
                continue;
            }
        }

        sleep(jitter.wait(options.min_wait_ms, options.max_wait_ms)).await;
        auto_scroll(page, options.scroll_steps, options.scroll_pause()).await;

        let (chunk, next) = match source.platform {
            Platform::Amazon => amazon::extract_list(page, &source.url, position, options).await,
            Platform::Flipkart => {
                flipkart::extract_list(page, &source.url, position, options).await
            }
        };
        info!("[{}] page {page_no}: {} rows", source.platform, chunk.len());
        position = next;
        report.pages_loaded += 1;
        report.rows.extend(chunk);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fixture::{FixtureBrowser, FixturePage};

    const SEARCH: &str = "https://www.amazon.in/s?k=earbuds";

    fn amazon_page(asins: &[&str]) -> String {
        let cards: String = asins
            .iter()
            .map(|asin| {
                format!(
                    r#"<div class="s-result-item" data-component-type="s-search-result" data-asin="{asin}">
                        <h2><a href="/dp/{asin}"><span>boAt Airdopes {asin}</span></a></h2>
                        <span class="a-price"><span class="a-offscreen">₹1,299</span></span></div>"#
                )
            })
            .collect();
        format!(r#"<html><body><div class="s-main-slot">{cards}</div></body></html>"#)
    }

    fn source(max_pages: u32) -> SourceConfig {
        SourceConfig {
            platform: Platform::Amazon,
            url: SEARCH.to_string(),
            max_pages,
        }
    }

    #[tokio::test]
    async fn positions_run_across_pages_without_gaps() {
        let fixture = FixtureBrowser::new()
            .with_page(SEARCH, FixturePage::new(amazon_page(&["A1", "A2", "A3"])))
            .with_page(format!("{SEARCH}&page=2"), FixturePage::new(amazon_page(&["B1", "B2"])))
            .with_page(format!("{SEARCH}&page=3"), FixturePage::new(amazon_page(&["C1", "C2", "C3", "C4"])));

        let report = crawl_source(&fixture, &source(3), &ScrapeOptions::without_delays(), &Jitter::seeded(3))
            .await
            .expect("crawl runs");

        let positions: Vec<u32> = report.rows.iter().map(|row| row.list_position).collect();
        assert_eq!(positions, (1..=9).collect::<Vec<_>>());
        assert_eq!(report.pages_loaded, 3);
        assert_eq!(report.rows[3].product_url.as_deref(), Some("https://www.amazon.in/dp/B1"));
        assert!(report.rows.iter().all(|row| row.source_url.as_deref() == Some(SEARCH)));
        assert_eq!(fixture.pages_opened(), 1);
        assert_eq!(fixture.pages_closed(), 1);
    }

    #[tokio::test]
    async fn failed_page_is_skipped_and_crawl_continues() {
        let fixture = FixtureBrowser::new()
            .with_page(SEARCH, FixturePage::new(amazon_page(&["A1", "A2"])))
            .with_page(format!("{SEARCH}&page=3"), FixturePage::new(amazon_page(&["C1"])));

        let report = crawl_source(&fixture, &source(3), &ScrapeOptions::without_delays(), &Jitter::seeded(3))
            .await
            .expect("crawl runs");

        assert_eq!(report.rows.len(), 3);
        assert_eq!(report.rows[2].list_position, 3);
        assert_eq!(report.pages_loaded, 2);
        assert_eq!(report.pages_skipped, 1);
        assert_eq!(fixture.visits(&format!("{SEARCH}&page=2")), 3);
    }

    #[tokio::test]
    async fn captcha_stops_remaining_pages() {
        let search = "https://www.flipkart.com/search?q=phone";
        let fixture = FixtureBrowser::new().with_page(
            search,
            FixturePage::new("<html><body>verify</body></html>").titled("reCAPTCHA"),
        );
        let source = SourceConfig {
            platform: Platform::Flipkart,
            url: search.to_string(),
            max_pages: 4,
        };

        let report = crawl_source(&fixture, &source, &ScrapeOptions::without_delays(), &Jitter::seeded(3))
            .await
            .expect("crawl runs");

        assert!(report.captcha);
        assert!(report.rows.is_empty());
        assert_eq!(report.pages_skipped, 4);
        assert_eq!(fixture.visits(&format!("{search}&page=2")), 0);
    }

    #[tokio::test]
    async fn context_uses_list_profile() {
        let fixture = FixtureBrowser::new()
            .with_page(SEARCH, FixturePage::new(amazon_page(&["A1"])));
        let options = ScrapeOptions::without_delays();
        crawl_source(&fixture, &source(1), &options, &Jitter::seeded(9))
            .await
            .expect("crawl runs");

        let profiles = fixture.profiles();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].viewport, (1420, 980));
        assert_eq!(profiles[0].locale, "en-IN");
        assert!(options.user_agents.contains(&profiles[0].user_agent));
    }

    #[tokio::test]
    async fn open_failure_is_an_error() {
        let fixture = FixtureBrowser::new().failing_open();
        let result = crawl_source(&fixture, &source(1), &ScrapeOptions::without_delays(), &Jitter::seeded(1)).await;
        assert!(result.is_err());
    }
}
