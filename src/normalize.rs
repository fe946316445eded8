use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::model::Platform;

static MONEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"₹?\s*(\d[\d,]*(?:\.\d*)?)").expect("money pattern is valid"));

static RUPEE_AMOUNTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"₹\s*(\d[\d,]*(?:\.\d*)?)").expect("rupee pattern is valid"));

static TOKEN_NOISE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9+]").expect("token pattern is valid"));

/// Aliases that map a model/series token onto the manufacturer.
const BRAND_ALIASES: &[(&str, &str)] = &[
    ("iphone", "Apple"),
    ("mi", "Xiaomi"),
    ("redmi", "Xiaomi"),
    ("moto", "Motorola"),
];

const BRANDS: &[&str] = &[
    "samsung", "apple", "xiaomi", "oneplus", "realme", "vivo", "oppo", "iqoo", "motorola", "tecno",
    "infinix", "lava", "nokia", "honor", "google", "acer", "poco",
];

/// Parse the first amount in `text` ("₹1,299.00 only" -> 1299.0).
pub fn parse_money(text: &str) -> Option<f64> {
    let caps = MONEY.captures(text)?;
    caps.get(1)?.as_str().replace(',', "").parse().ok()
}

/// All `₹`-prefixed amounts in `text`, de-duplicated and sorted high to low.
pub fn rupee_amounts(text: &str) -> Vec<f64> {
    let mut amounts: Vec<f64> = RUPEE_AMOUNTS
        .captures_iter(text)
        .filter_map(|caps| caps.get(1)?.as_str().replace(',', "").parse().ok())
        .collect();
    amounts.sort_by(|a, b| b.total_cmp(a));
    amounts.dedup();
    amounts
}

/// Discount of `price` against `mrp`, rounded to one decimal place with
/// ties to even (6.25 -> 6.2). A zero price is treated as unknown.
pub fn percent_off(mrp: Option<f64>, price: Option<f64>) -> Option<f64> {
    let (mrp, price) = (mrp?, price?);
    if mrp > 0.0 && price > 0.0 && price <= mrp {
        Some((1000.0 * (mrp - price) / mrp).round_ties_even() / 10.0)
    } else {
        None
    }
}

/// Best-effort brand from the leading words of a product name.
pub fn guess_brand(name: &str) -> Option<String> {
    for raw in name.split_whitespace().take(4) {
        let token = TOKEN_NOISE.replace_all(raw, "").to_lowercase();
        if let Some((_, brand)) = BRAND_ALIASES.iter().find(|(alias, _)| *alias == token) {
            return Some((*brand).to_string());
        }
        if BRANDS.contains(&token.as_str()) {
            return Some(capitalize(&token));
        }
    }
    None
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Trim user input and default the scheme to https. Returns `None` when the
/// result has no usable scheme and host.
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    let candidate = if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed.trim_start_matches('/'))
    };
    let parsed = Url::parse(&candidate).ok()?;
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Some(candidate),
        _ => None,
    }
}

/// Keep `url` only if its host belongs to `platform`.
pub fn ensure_allowed(url: &str, platform: Platform) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    host.contains(platform.domain_fragment()).then(|| url.to_string())
}

/// Listing URL for the given 1-based page number.
pub fn page_url(url: &str, page_no: u32) -> String {
    if page_no <= 1 {
        return url.to_string();
    }
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}page={page_no}")
}

/// Resolve `href` against the page it was found on.
pub fn absolute_url(base: &str, href: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    base.join(href.trim()).ok().map(String::from)
}
