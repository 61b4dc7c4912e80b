//! dom_extract.rs - Ordered extractor chains for seller rows and inline data
//!
//! Each field is read by a list of extractors tried in priority order; the
//! first one yielding an acceptable value wins.

use log::debug;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::models::{OfferType, SellerOffer};
use crate::offers_api::parse_price;
use crate::page::{Locator, PageNode};

/// "Show all sellers" control candidates.
pub const SHOW_ALL_LOCATORS: &[Locator] = &[
    Locator::TestId("see-all-sellers"),
    Locator::TestId("more-seller-options"),
    Locator::AttrContains("aria-label", "all sellers"),
];

/// Seller listing container candidates.
pub const CONTAINER_LOCATORS: &[Locator] = &[
    Locator::TestId("all-sellers-list"),
    Locator::AttrContains("data-testid", "seller-list"),
    Locator::Class("seller-listing"),
    Locator::AttrContains("aria-label", "sellers"),
];

/// Row candidates inside the container.
pub const ROW_LOCATORS: &[Locator] = &[
    Locator::TestId("seller-row"),
    Locator::Class("seller-offer"),
    Locator::Tag("li"),
];

/// Seller info blocks outside the listing (buy box).
pub const SELLER_INFO_LOCATORS: &[Locator] = &[
    Locator::TestId("seller-info"),
    Locator::Class("seller-info"),
];

const SELLER_LINK: Locator = Locator::AttrContains("href", "/seller/");
const BOILERPLATE: &[&str] = &["sold", "shipped"];
const PLATFORM_FULFILLED_PHRASES: &[&str] = &["walmart fulfilled", "fulfilled by walmart", "wfs"];
const PRO_SELLER_PHRASES: &[&str] = &["pro seller"];
const SELLER_NAME_KEYS: &[&str] = &["sellerDisplayName", "sellerName"];

/// One way of reading a field from a row.
pub trait FieldExtractor<T>: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, row: &PageNode) -> Option<T>;
}

/// Run the chain in order; `accept` filters candidates before they win.
pub fn first_match<T>(chain: &[&dyn FieldExtractor<T>], row: &PageNode, accept: impl Fn(&T) -> bool) -> Option<T> {
    for extractor in chain {
        match extractor.extract(row) {
            Some(value) if accept(&value) => return Some(value),
            Some(_) => debug!("Extractor '{}' produced a rejected value", extractor.name()),
            None => {}
        }
    }
    None
}

/// Trimmed name, or None when empty or boilerplate ("Sold and shipped by").
pub fn clean_seller_name(raw: &str) -> Option<String> {
    let name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let lower = name.to_lowercase();
    if name.is_empty() || BOILERPLATE.iter().any(|b| lower.contains(b)) {
        return None;
    }
    Some(name)
}

fn is_valid_name(name: &String) -> bool {
    clean_seller_name(name).as_deref() == Some(name.as_str())
}

fn contains_phrase(text: &str, phrases: &[&str]) -> bool {
    let lower = text.to_lowercase();
    phrases.iter().any(|p| lower.contains(p))
}

// ============================================================================
// Name extractors
// ============================================================================

/// `aria-label` on the row or its seller link
pub struct AccessibleLabel;

impl FieldExtractor<String> for AccessibleLabel {
    fn name(&self) -> &'static str {
        "accessible-label"
    }

    fn extract(&self, row: &PageNode) -> Option<String> {
        row.attr("aria-label")
            .or_else(|| row.find_first(&SELLER_LINK).and_then(|l| l.attr("aria-label")))
            .and_then(clean_seller_name)
    }
}

/// Dedicated name element nested in the row
pub struct NestedNameElement;

impl FieldExtractor<String> for NestedNameElement {
    fn name(&self) -> &'static str {
        "nested-name"
    }

    fn extract(&self, row: &PageNode) -> Option<String> {
        row.find_first_of(&[Locator::TestId("seller-name"), Locator::Class("seller-name"), SELLER_LINK])
            .and_then(|node| clean_seller_name(&node.text_content()))
    }
}

/// The row's own text
pub struct FreeText;

impl FieldExtractor<String> for FreeText {
    fn name(&self) -> &'static str {
        "free-text"
    }

    fn extract(&self, row: &PageNode) -> Option<String> {
        clean_seller_name(&row.text)
    }
}

/// Text of the element wrapping the seller link
pub struct AncestorText;

impl FieldExtractor<String> for AncestorText {
    fn name(&self) -> &'static str {
        "ancestor-text"
    }

    fn extract(&self, row: &PageNode) -> Option<String> {
        let (_, parent) = row.find_with_parent(&SELLER_LINK)?;
        clean_seller_name(&parent.text)
    }
}

// ============================================================================
// Price / arrival extractors
// ============================================================================

/// Machine-readable price attribute
pub struct PriceAttribute;

impl FieldExtractor<Decimal> for PriceAttribute {
    fn name(&self) -> &'static str {
        "price-attribute"
    }

    fn extract(&self, row: &PageNode) -> Option<Decimal> {
        row.find_first(&Locator::AttrContains("itemprop", "price"))
            .and_then(|n| n.attr("content"))
            .and_then(parse_price)
    }
}

/// Visible price element
pub struct PriceElement;

impl FieldExtractor<Decimal> for PriceElement {
    fn name(&self) -> &'static str {
        "price-element"
    }

    fn extract(&self, row: &PageNode) -> Option<Decimal> {
        row.find_first_of(&[Locator::TestId("price"), Locator::Class("price")])
            .and_then(|n| parse_price(&n.text_content()))
    }
}

/// First dollar amount anywhere in the row
pub struct DollarText;

impl FieldExtractor<Decimal> for DollarText {
    fn name(&self) -> &'static str {
        "dollar-text"
    }

    fn extract(&self, row: &PageNode) -> Option<Decimal> {
        let text = row.text_content();
        let start = text.find('$')?;
        parse_price(&text[start..])
    }
}

pub struct ArrivalElement;

impl FieldExtractor<String> for ArrivalElement {
    fn name(&self) -> &'static str {
        "arrival-element"
    }

    fn extract(&self, row: &PageNode) -> Option<String> {
        row.find_first_of(&[Locator::TestId("delivery-date"), Locator::Class("delivery")])
            .map(|n| n.text_content())
    }
}

/// Any text fragment announcing an arrival date
pub struct ArrivalPhrase;

impl FieldExtractor<String> for ArrivalPhrase {
    fn name(&self) -> &'static str {
        "arrival-phrase"
    }

    fn extract(&self, row: &PageNode) -> Option<String> {
        let text = row.text_content();
        // ASCII lowering keeps byte offsets valid for slicing `text`.
        let start = text.to_ascii_lowercase().find("arrives")?;
        Some(text[start..].to_string())
    }
}

// ============================================================================
// Row -> SellerOffer
// ============================================================================

const NAME_CHAIN: &[&dyn FieldExtractor<String>] = &[&AccessibleLabel, &NestedNameElement, &FreeText, &AncestorText];
const PRICE_CHAIN: &[&dyn FieldExtractor<Decimal>] = &[&PriceAttribute, &PriceElement, &DollarText];
const ARRIVAL_CHAIN: &[&dyn FieldExtractor<String>] = &[&ArrivalElement, &ArrivalPhrase];

pub fn extract_name(row: &PageNode) -> Option<String> {
    first_match(NAME_CHAIN, row, is_valid_name)
}

pub fn extract_price(row: &PageNode) -> Option<Decimal> {
    first_match(PRICE_CHAIN, row, |p| *p > Decimal::ZERO)
}

pub fn extract_arrival(row: &PageNode) -> Option<String> {
    first_match(ARRIVAL_CHAIN, row, |a| !a.trim().is_empty())
}

/// Build an offer from a seller row or info block; None without a usable name.
pub fn extract_offer(row: &PageNode, platform_seller_name: &str) -> Option<SellerOffer> {
    let name = extract_name(row)?;
    let text = row.text_content();

    let offer_type = if name.eq_ignore_ascii_case(platform_seller_name) {
        OfferType::PlatformSold
    } else {
        let platform_fulfilled = contains_phrase(&text, PLATFORM_FULFILLED_PHRASES);
        let pro = row.find_first(&Locator::Class("pro-seller")).is_some() || contains_phrase(&text, PRO_SELLER_PHRASES);
        OfferType::from_flags(platform_fulfilled, pro)
    };

    let mut offer = SellerOffer::new(&name, extract_price(row), offer_type);
    offer.arrival = extract_arrival(row);
    Some(offer)
}

// ============================================================================
// Embedded structured data
// ============================================================================

/// Seller names found in inline data blocks, deduplicated in first-seen order.
pub fn scan_seller_names(blocks: &[String]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for block in blocks {
        let found = match serde_json::from_str::<Value>(block) {
            Ok(value) => {
                let mut found = Vec::new();
                collect_json_names(&value, &mut found);
                found
            }
            Err(_) => scan_text_names(block),
        };
        for name in found.iter().filter_map(|n| clean_seller_name(n)) {
            if !names.iter().any(|existing| existing.eq_ignore_ascii_case(&name)) {
                names.push(name);
            }
        }
    }
    names
}

fn collect_json_names(value: &Value, found: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                match child {
                    Value::String(s) if SELLER_NAME_KEYS.contains(&key.as_str()) => found.push(s.clone()),
                    _ => collect_json_names(child, found),
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_json_names(item, found)),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
    }
}

/// Pattern scan for `"sellerName":"..."` in blocks that are not plain JSON.
fn scan_text_names(block: &str) -> Vec<String> {
    let mut found = Vec::new();
    for key in SELLER_NAME_KEYS {
        let pattern = format!("\"{}\"", key);
        let mut rest = block;
        while let Some(pos) = rest.find(&pattern) {
            rest = &rest[pos + pattern.len()..];
            let value = rest
                .trim_start()
                .strip_prefix(':')
                .map(str::trim_start)
                .and_then(|v| v.strip_prefix('"'))
                .and_then(|v| v.find('"').map(|end| &v[..end]));
            if let Some(name) = value {
                found.push(name.to_string());
            }
        }
    }
    found
}
