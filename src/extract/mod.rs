//! DOM-to-record adapters.
//!
//! Field lookups are ordered lists of [`Strategy`] values: the first one
//! that yields a non-empty value wins. Adapters run over a `scraper`
//! snapshot of the live page, so the same code is exercised by static
//! HTML fixtures in tests.

use scraper::{ElementRef, Selector};

use crate::model::Platform;
use crate::normalize::parse_money;

pub mod amazon;
pub mod flipkart;

/// Price pair read from a product detail page.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PdpPrices {
    pub price: Option<f64>,
    pub mrp: Option<f64>,
}

/// Run the detail-page adapter for `platform` over a page snapshot.
pub fn parse_pdp(platform: Platform, html: &str) -> PdpPrices {
    match platform {
        Platform::Amazon => amazon::parse_pdp(html),
        Platform::Flipkart => flipkart::parse_pdp(html),
    }
}

/// Compile a selector known at build time.
pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector `{css}`: {e:?}"))
}

#[derive(Debug, Clone)]
enum Read {
    Text,
    Attr(&'static str),
}

/// One way of reading a field out of an element subtree.
#[derive(Debug, Clone)]
pub struct Strategy {
    selector: Selector,
    read: Read,
}

impl Strategy {
    /// Trimmed text of the first element matching `css`.
    pub fn text(css: &str) -> Self {
        Self {
            selector: selector(css),
            read: Read::Text,
        }
    }

    /// Trimmed attribute of the first element matching `css`.
    pub fn attr(css: &str, name: &'static str) -> Self {
        Self {
            selector: selector(css),
            read: Read::Attr(name),
        }
    }

    pub fn apply(&self, scope: ElementRef<'_>) -> Option<String> {
        let element = scope.select(&self.selector).next()?;
        match self.read {
            Read::Text => text_of(element),
            Read::Attr(name) => attr_of(element, name),
        }
    }
}

/// First non-empty value produced by `chain`.
pub fn resolve(scope: ElementRef<'_>, chain: &[Strategy]) -> Option<String> {
    chain.iter().find_map(|strategy| strategy.apply(scope))
}

/// First amount produced by `chain`.
pub fn resolve_money(scope: ElementRef<'_>, chain: &[Strategy]) -> Option<f64> {
    chain
        .iter()
        .find_map(|strategy| strategy.apply(scope).as_deref().and_then(parse_money))
}

pub fn text_of(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<String>();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

pub fn attr_of(element: ElementRef<'_>, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
