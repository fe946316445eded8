use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use super::{attr_of, resolve, resolve_money, selector, PdpPrices, Strategy};
use crate::browser::{auto_scroll, Page};
use crate::model::{ListingFields, Platform, ProductRecord, ScrapeOptions};
use crate::normalize::{absolute_url, rupee_amounts};

/// Amounts below this are usually EMIs, offers or accessory add-ons rather
/// than the product price. Tuned to phone/laptop listings; it misreads
/// categories that genuinely sell below it.
pub const PLAUSIBLE_PRICE_FLOOR: f64 = 3000.0;

const POPUP_CLOSE: &str = "button._2KpZ6l._2doB4z";

static ANCHOR: Lazy<Selector> = Lazy::new(|| selector("a[href*='/p/']"));

static CONTAINER: Lazy<Selector> = Lazy::new(|| {
    selector("div._2kHMtA, div._4ddWXP, div._1AtVbE, div.gUuXy-, div.y0S0Pe")
});

static TITLE: Lazy<Vec<Strategy>> = Lazy::new(|| {
    vec![
        Strategy::text("div._4rR01T"),
        Strategy::text("a.s1Q9rs"),
        Strategy::text("div.KzDlHZ"),
        Strategy::text("a.IRpwTa"),
        Strategy::attr("img", "alt"),
    ]
});

static PRICE: Lazy<Vec<Strategy>> = Lazy::new(|| {
    vec![
        Strategy::text("div._30jeq3._1_WHN1"),
        Strategy::text("div._30jeq3"),
    ]
});

static MRP: Lazy<Vec<Strategy>> = Lazy::new(|| {
    vec![
        Strategy::text("div._3I9_wc._27UcVY"),
        Strategy::text("div._3I9_wc"),
    ]
});

static PDP_PRICE: Lazy<Vec<Strategy>> = Lazy::new(|| {
    vec![
        Strategy::text("div._30jeq3._16Jk6d"),
        Strategy::text("div.Nx9bqj.CxhGGd"),
        Strategy::text("div._30jeq3"),
    ]
});

static PDP_MRP: Lazy<Vec<Strategy>> = Lazy::new(|| {
    vec![
        Strategy::text("div._3I9_wc._2p6lqe"),
        Strategy::text("div._3I9_wc"),
    ]
});

/// Close the login overlay if it is showing. Failures are ignored.
pub async fn dismiss_popups(page: &dyn Page) {
    match page.click(POPUP_CLOSE).await {
        Ok(true) => debug!("flipkart: closed login popup"),
        Ok(false) => {}
        Err(e) => debug!("flipkart: popup click failed: {e}"),
    }
    if let Err(e) = page.press_key("Escape").await {
        debug!("flipkart: escape failed: {e}");
    }
}

pub async fn extract_list(
    page: &dyn Page,
    source_url: &str,
    offset: u32,
    options: &ScrapeOptions,
) -> (Vec<ProductRecord>, u32) {
    dismiss_popups(page).await;
    tokio::time::sleep(Duration::from_millis(options.popup_settle_ms)).await;
    auto_scroll(page, options.scroll_steps, options.scroll_pause()).await;

    let html = match page.content().await {
        Ok(html) => html,
        Err(e) => {
            warn!("flipkart: could not read page content: {e}");
            return (Vec::new(), offset);
        }
    };
    parse_list(&html, source_url, offset, Utc::now())
}

pub fn parse_list(
    html: &str,
    source_url: &str,
    offset: u32,
    captured_at: DateTime<Utc>,
) -> (Vec<ProductRecord>, u32) {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut position = offset;
    let mut rows = Vec::new();

    for anchor in document.select(&ANCHOR) {
        let Some(product_url) =
            attr_of(anchor, "href").and_then(|href| absolute_url(source_url, &href))
        else {
            continue;
        };
        if !seen.insert(product_url.clone()) {
            continue;
        }

        let container = container_of(anchor);
        let name = resolve(container, &TITLE);
        let mut price = resolve_money(container, &PRICE);
        let mut mrp = resolve_money(container, &MRP);
        if price.is_none() || mrp.is_none() {
            let text = container.text().collect::<Vec<_>>().join(" ");
            (price, mrp) = reconcile_prices(price, mrp, &rupee_amounts(&text));
        }

        if name.is_none() && price.is_none() {
            continue;
        }
        position += 1;
        rows.push(ProductRecord::from_listing(
            Platform::Flipkart,
            position,
            ListingFields {
                name,
                product_url: Some(product_url),
                image_url: None,
                price,
                mrp,
            },
            source_url,
            captured_at,
        ));
    }

    debug!("flipkart: {} products extracted from {} links", rows.len(), seen.len());
    (rows, position)
}

/// Nearest known product tile around `anchor`, else its parent.
fn container_of(anchor: ElementRef<'_>) -> ElementRef<'_> {
    anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|element| CONTAINER.matches(element))
        .or_else(|| anchor.parent().and_then(ElementRef::wrap))
        .unwrap_or(anchor)
}

/// Fill a missing price/MRP from the `₹` amounts found in a tile's text.
/// `amounts` must be sorted high to low. Of the two largest plausible
/// amounts the larger is the MRP and the smaller the price; a lone amount
/// can only become the price.
pub fn reconcile_prices(
    price: Option<f64>,
    mrp: Option<f64>,
    amounts: &[f64],
) -> (Option<f64>, Option<f64>) {
    let plausible: Vec<f64> = amounts
        .iter()
        .copied()
        .filter(|amount| *amount >= PLAUSIBLE_PRICE_FLOOR)
        .collect();
    let candidates = if plausible.is_empty() {
        amounts
    } else {
        plausible.as_slice()
    };

    match candidates {
        [] => (price, mrp),
        [only] => (price.or(Some(*only)), mrp),
        [first, second, ..] => (
            price.or(Some(first.min(*second))),
            mrp.or(Some(first.max(*second))),
        ),
    }
}

pub fn parse_pdp(html: &str) -> PdpPrices {
    let document = Html::parse_document(html);
    let root = document.root_element();
    PdpPrices {
        price: resolve_money(root, &PDP_PRICE),
        mrp: resolve_money(root, &PDP_MRP),
    }
}
