use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::normalize::{ensure_allowed, guess_brand, normalize_url, percent_off};

pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Amazon,
    Flipkart,
}

impl Platform {
    /// Host fragment a listing URL must contain to be accepted.
    pub fn domain_fragment(self) -> &'static str {
        match self {
            Platform::Amazon => "amazon.",
            Platform::Flipkart => "flipkart.com",
        }
    }

    /// Selector that marks a listing page as loaded.
    pub fn ready_selector(self) -> &'static str {
        match self {
            Platform::Amazon => "div.s-main-slot",
            Platform::Flipkart => "a[href*='/p/'], div._1YokD2, div._2kHMtA, div.y0S0Pe",
        }
    }

    /// Platform owning a product URL. Anything that is not Amazon is
    /// treated as Flipkart, the only other configured source.
    pub fn detect(url: &str) -> Platform {
        if url.contains("amazon") {
            Platform::Amazon
        } else {
            Platform::Flipkart
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Amazon => "amazon",
            Platform::Flipkart => "flipkart",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One product as seen on a listing page, optionally completed from its
/// detail page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProductRecord {
    pub date: NaiveDate,
    pub timestamp: DateTime<Utc>,
    pub platform: Platform,
    pub list_position: u32,
    pub product_name: Option<String>,
    pub brand_guess: Option<String>,
    pub price: Option<f64>,
    pub mrp: Option<f64>,
    pub discount_percent: Option<f64>,
    pub rating: Option<f64>,
    pub review_count: Option<u64>,
    pub product_url: Option<String>,
    pub image_url: Option<String>,
    pub source_url: Option<String>,
}

/// Fields pulled out of one listing card before it becomes a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFields {
    pub name: Option<String>,
    pub product_url: Option<String>,
    pub image_url: Option<String>,
    pub price: Option<f64>,
    pub mrp: Option<f64>,
}

impl ProductRecord {
    pub fn from_listing(
        platform: Platform,
        list_position: u32,
        fields: ListingFields,
        source_url: &str,
        captured_at: DateTime<Utc>,
    ) -> Self {
        let brand_guess = fields.name.as_deref().and_then(guess_brand);
        Self {
            date: captured_at.date_naive(),
            timestamp: captured_at,
            platform,
            list_position,
            product_name: fields.name,
            brand_guess,
            price: fields.price,
            mrp: fields.mrp,
            discount_percent: percent_off(fields.mrp, fields.price),
            rating: None,
            review_count: None,
            product_url: fields.product_url,
            image_url: fields.image_url,
            source_url: Some(source_url.to_string()),
        }
    }

    /// Fill price and MRP only where they are missing, then recompute the
    /// discount from whatever pair results. Returns true if anything was filled.
    pub fn backfill(&mut self, price: Option<f64>, mrp: Option<f64>) -> bool {
        let mut filled = false;
        if self.price.is_none() && price.is_some() {
            self.price = price;
            filled = true;
        }
        if self.mrp.is_none() && mrp.is_some() {
            self.mrp = mrp;
            filled = true;
        }
        self.discount_percent = percent_off(self.mrp, self.price);
        filled
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub platform: Platform,
    pub url: String,
    pub max_pages: u32,
}

/// Run-wide tuning, shared read-only by every task of a run.
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub headless: bool,
    pub min_wait_ms: u64,
    pub max_wait_ms: u64,
    pub scroll_pause_ms: u64,
    pub scroll_steps: u32,
    pub timeout_ms: u64,
    pub pdp_concurrency: usize,
    pub pdp_prices: bool,
    pub nav_attempts: u32,
    pub retry_backoff_ms: u64,
    pub popup_settle_ms: u64,
    pub list_viewport: (u32, u32),
    pub pdp_viewport: (u32, u32),
    pub locale: String,
    pub user_agents: Vec<String>,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            headless: true,
            min_wait_ms: 900,
            max_wait_ms: 2200,
            scroll_pause_ms: 650,
            scroll_steps: 8,
            timeout_ms: 65_000,
            pdp_concurrency: 4,
            pdp_prices: false,
            nav_attempts: 3,
            retry_backoff_ms: 1500,
            popup_settle_ms: 800,
            list_viewport: (1420, 980),
            pdp_viewport: (1280, 900),
            locale: "en-IN".to_string(),
            user_agents: DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
        }
    }
}

impl ScrapeOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_ms)
    }

    /// Options with every deliberate pause removed; used by tests.
    pub fn without_delays() -> Self {
        Self {
            min_wait_ms: 0,
            max_wait_ms: 0,
            scroll_pause_ms: 0,
            retry_backoff_ms: 0,
            popup_settle_ms: 0,
            timeout_ms: 2_000,
            ..Self::default()
        }
    }
}

/// Listing URLs and flags for one scrape, as received from the caller.
#[derive(Debug, Clone, Default)]
pub struct ScrapeRequest {
    pub amazon_url: Option<String>,
    pub flipkart_url: Option<String>,
    pub max_pages: u32,
    pub pdp_prices: bool,
}

impl ScrapeRequest {
    /// One source per URL that normalizes and passes the platform allow-list.
    pub fn sources(&self) -> Vec<SourceConfig> {
        [
            (Platform::Amazon, self.amazon_url.as_deref()),
            (Platform::Flipkart, self.flipkart_url.as_deref()),
        ]
        .into_iter()
        .filter_map(|(platform, raw)| {
            let url = ensure_allowed(&normalize_url(raw?)?, platform)?;
            Some(SourceConfig {
                platform,
                url,
                max_pages: self.max_pages.max(1),
            })
        })
        .collect()
    }
}

/// Sources whose listing pages answered with a captcha challenge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CaptchaFlags {
    pub amazon: bool,
    pub flipkart: bool,
}

impl CaptchaFlags {
    pub fn mark(&mut self, platform: Platform) {
        match platform {
            Platform::Amazon => self.amazon = true,
            Platform::Flipkart => self.flipkart = true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScrapeOutcome {
    pub rows: Vec<ProductRecord>,
    pub captcha: CaptchaFlags,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(price: Option<f64>, mrp: Option<f64>) -> ProductRecord {
        ProductRecord::from_listing(
            Platform::Amazon,
            1,
            ListingFields {
                name: Some("Samsung Galaxy M34".into()),
                product_url: Some("https://www.amazon.in/dp/B0C".into()),
                price,
                mrp,
                ..Default::default()
            },
            "https://www.amazon.in/s?k=phone",
            Utc::now(),
        )
    }

    #[test]
    fn listing_record_derives_brand_and_discount() {
        let row = record(Some(800.0), Some(1000.0));
        assert_eq!(row.brand_guess.as_deref(), Some("Samsung"));
        assert_eq!(row.discount_percent, Some(20.0));
        assert_eq!(row.rating, None);
        assert_eq!(row.review_count, None);
        assert_eq!(row.date, row.timestamp.date_naive());
    }

    #[test]
    fn backfill_never_overwrites_existing_values() {
        let mut row = record(Some(900.0), None);
        assert!(row.backfill(Some(700.0), Some(1200.0)));
        assert_eq!(row.price, Some(900.0));
        assert_eq!(row.mrp, Some(1200.0));
        assert_eq!(row.discount_percent, Some(25.0));

        let mut complete = record(Some(500.0), Some(1000.0));
        assert!(!complete.backfill(Some(1.0), Some(2.0)));
        assert_eq!(complete.price, Some(500.0));
        assert_eq!(complete.discount_percent, Some(50.0));
    }

    #[test]
    fn sources_skip_disallowed_urls() {
        let request = ScrapeRequest {
            amazon_url: Some("https://evil.com".into()),
            flipkart_url: Some("www.flipkart.com/search?q=phone".into()),
            max_pages: 0,
            pdp_prices: false,
        };
        let sources = request.sources();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].platform, Platform::Flipkart);
        assert_eq!(sources[0].url, "https://www.flipkart.com/search?q=phone");
        assert_eq!(sources[0].max_pages, 1);
    }

    #[test]
    fn platform_serializes_lowercase() {
        let json = serde_json::to_string(&Platform::Flipkart).expect("serializes");
        assert_eq!(json, "\"flipkart\"");
        assert_eq!(Platform::detect("https://www.amazon.in/dp/X"), Platform::Amazon);
        assert_eq!(Platform::detect("https://www.flipkart.com/x/p/itm"), Platform::Flipkart);
    }
}
