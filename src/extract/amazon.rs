use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use super::{attr_of, resolve, resolve_money, selector, PdpPrices, Strategy};
use crate::browser::Page;
use crate::model::{ListingFields, Platform, ProductRecord, ScrapeOptions};
use crate::normalize::absolute_url;

pub const RESULTS_CONTAINER: &str = "div.s-main-slot";

static CARD: Lazy<Selector> = Lazy::new(|| {
    selector(r#"div.s-main-slot div.s-result-item[data-component-type="s-search-result"]"#)
});

static LINK: Lazy<Selector> = Lazy::new(|| selector("h2 a"));

static TITLE: Lazy<Vec<Strategy>> = Lazy::new(|| {
    vec![
        Strategy::text("h2 a span.a-size-medium"),
        Strategy::text("h2 a span"),
        Strategy::text("h2"),
        Strategy::attr("h2 a", "aria-label"),
    ]
});

static IMAGE: Lazy<Vec<Strategy>> = Lazy::new(|| vec![Strategy::attr("img.s-image", "src")]);

static PRICE: Lazy<Vec<Strategy>> =
    Lazy::new(|| vec![Strategy::text("span.a-price:not(.a-text-price) span.a-offscreen")]);

static MRP: Lazy<Vec<Strategy>> =
    Lazy::new(|| vec![Strategy::text("span.a-text-price span.a-offscreen")]);

static PDP_PRICE: Lazy<Vec<Strategy>> = Lazy::new(|| {
    vec![
        Strategy::text("#corePrice_feature_div .a-offscreen"),
        Strategy::text("#apex_desktop .a-offscreen"),
        Strategy::text("span.a-price:not(.a-text-price) span.a-offscreen"),
    ]
});

static PDP_MRP: Lazy<Vec<Strategy>> =
    Lazy::new(|| vec![Strategy::text("span.a-price.a-text-price span.a-offscreen")]);

/// Extract the result cards of a loaded search page. Returns the records
/// and the position of the last one (`offset` when nothing was found).
pub async fn extract_list(
    page: &dyn Page,
    source_url: &str,
    offset: u32,
    options: &ScrapeOptions,
) -> (Vec<ProductRecord>, u32) {
    if let Err(e) = page.wait_for(RESULTS_CONTAINER, options.timeout()).await {
        debug!("amazon: results container never appeared: {e}");
        return (Vec::new(), offset);
    }
    let html = match page.content().await {
        Ok(html) => html,
        Err(e) => {
            warn!("amazon: could not read page content: {e}");
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
    let mut position = offset;
    let mut rows = Vec::new();

    for card in document.select(&CARD) {
        let Some(fields) = card_fields(card, source_url) else {
            continue;
        };
        position += 1;
        rows.push(ProductRecord::from_listing(
            Platform::Amazon,
            position,
            fields,
            source_url,
            captured_at,
        ));
    }

    debug!("amazon: {} cards extracted", rows.len());
    (rows, position)
}

fn card_fields(card: scraper::ElementRef<'_>, source_url: &str) -> Option<ListingFields> {
    let href = card.select(&LINK).next().and_then(|link| attr_of(link, "href"));
    let product_url = match href {
        Some(href) => absolute_url(source_url, &href),
        None => attr_of(card, "data-asin")
            .and_then(|asin| absolute_url(source_url, &format!("/dp/{asin}"))),
    };

    let fields = ListingFields {
        name: resolve(card, &TITLE),
        product_url,
        image_url: resolve(card, &IMAGE),
        price: resolve_money(card, &PRICE),
        mrp: resolve_money(card, &MRP),
    };

    let useful = fields.name.is_some() || fields.price.is_some() || fields.product_url.is_some();
    useful.then_some(fields)
}

pub fn parse_pdp(html: &str) -> PdpPrices {
    let document = Html::parse_document(html);
    let root = document.root_element();
    PdpPrices {
        price: resolve_money(root, &PDP_PRICE),
        mrp: resolve_money(root, &PDP_MRP),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "https://www.amazon.in/s?k=smartphone";

    fn card(asin: &str, inner: &str) -> String {
        format!(
            r#"<div class="s-result-item" data-component-type="s-search-result" data-asin="{asin}">{inner}</div>"#
        )
    }

    fn page(cards: &[String]) -> String {
        format!(
            r#"<html><body><div class="s-main-slot">{}<div class="s-result-item">ad</div></div></body></html>"#,
            cards.join("")
        )
    }

    #[test]
    fn parses_full_and_partial_cards() {
        let html = page(&[
            card(
                "B0CHX1W1XY",
                r#"<h2><a href="/Apple-iPhone-15/dp/B0CHX1W1XY?ref=sr_1_1"><span class="a-size-medium">Apple iPhone 15 (128 GB) - Black</span></a></h2>
                   <img class="s-image" src="https://m.media-amazon.com/images/I/71d7.jpg">
                   <span class="a-price"><span class="a-offscreen">₹69,900</span></span>
                   <span class="a-price a-text-price"><span class="a-offscreen">₹79,900</span></span>"#,
            ),
            card(
                "B0D5YCYS1G",
                r#"<h2><a href="/dp/B0D5YCYS1G"><span>Redmi 13C 5G</span></a></h2>
                   <span class="a-price"><span class="a-offscreen">₹9,999</span></span>"#,
            ),
        ]);

        let (rows, last) = parse_list(&html, SOURCE, 0, Utc::now());
        assert_eq!(rows.len(), 2);
        assert_eq!(last, 2);

        let first = &rows[0];
        assert_eq!(first.platform, Platform::Amazon);
        assert_eq!(first.list_position, 1);
        assert_eq!(first.product_name.as_deref(), Some("Apple iPhone 15 (128 GB) - Black"));
        assert_eq!(first.brand_guess.as_deref(), Some("Apple"));
        assert_eq!(first.price, Some(69900.0));
        assert_eq!(first.mrp, Some(79900.0));
        assert_eq!(first.discount_percent, Some(12.5));
        assert_eq!(
            first.product_url.as_deref(),
            Some("https://www.amazon.in/Apple-iPhone-15/dp/B0CHX1W1XY?ref=sr_1_1")
        );
        assert_eq!(
            first.image_url.as_deref(),
            Some("https://m.media-amazon.com/images/I/71d7.jpg")
        );
        assert_eq!(first.source_url.as_deref(), Some(SOURCE));

        let second = &rows[1];
        assert_eq!(second.list_position, 2);
        assert_eq!(second.brand_guess.as_deref(), Some("Xiaomi"));
        assert_eq!(second.mrp, None);
        assert_eq!(second.discount_percent, None);
    }

    #[test]
    fn falls_back_to_asin_and_aria_label() {
        let html = page(&[card(
            "B0TESTASIN",
            r#"<h2><a aria-label="Nokia 105 Classic"></a></h2>"#,
        )]);
        let (rows, _) = parse_list(&html, SOURCE, 0, Utc::now());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].product_name.as_deref(), Some("Nokia 105 Classic"));
        assert_eq!(rows[0].product_url.as_deref(), Some("https://www.amazon.in/dp/B0TESTASIN"));
    }

    #[test]
    fn empty_cards_are_skipped_without_consuming_positions() {
        let html = page(&[
            card("", "<div>sponsored placeholder</div>"),
            card("B0AAA", r#"<h2>Lava Agni 3</h2>"#),
        ]);
        let (rows, last) = parse_list(&html, SOURCE, 10, Utc::now());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].list_position, 11);
        assert_eq!(last, 11);
    }

    #[test]
    fn missing_container_yields_nothing() {
        let (rows, last) = parse_list("<html><body>robot check</body></html>", SOURCE, 4, Utc::now());
        assert!(rows.is_empty());
        assert_eq!(last, 4);
    }

    #[test]
    fn detail_page_prefers_core_price_block() {
        let html = r#"<html><body>
            <div id="corePrice_feature_div"><span class="a-price"><span class="a-offscreen">₹1,15,999.00</span></span></div>
            <span class="a-price a-text-price"><span class="a-offscreen">₹1,34,900.00</span></span>
        </body></html>"#;
        let prices = parse_pdp(html);
        assert_eq!(prices.price, Some(115999.0));
        assert_eq!(prices.mrp, Some(134900.0));
    }

    #[test]
    fn detail_page_without_prices() {
        assert_eq!(parse_pdp("<html><body>Currently unavailable.</body></html>"), PdpPrices::default());
    }
}
