//! models.rs - Core data structures shared by the resolver and the fee engine
//!
//! Defines ProductSnapshot, SellerOffer, the cache entry, pricing overrides
//! and the aggregated record handed to presentation/export collaborators.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Fulfillment-type / badge markers meaning the platform ships the item.
const PLATFORM_FULFILLMENT_MARKERS: &[&str] = &["wfs", "fulfillment services", "platform fulfilled"];

/// Badge markers flagging hazardous materials.
const HAZMAT_MARKERS: &[&str] = &["hazmat", "hazardous"];

/// Physical package attributes. Inches and pounds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dimensions {
    pub length: Decimal,
    pub width: Decimal,
    pub height: Decimal,
    pub weight: Decimal,
}

impl Dimensions {
    pub fn new(length: Decimal, width: Decimal, height: Decimal, weight: Decimal) -> Self {
        Dimensions { length, width, height, weight }
    }

    pub fn volume(&self) -> Decimal {
        self.length * self.width * self.height
    }

    pub fn longest(&self) -> Decimal {
        self.length.max(self.width).max(self.height)
    }

    /// Middle value of the three sides.
    pub fn median(&self) -> Decimal {
        let mut sides = [self.length, self.width, self.height];
        sides.sort();
        sides[1]
    }

    pub fn girth(&self) -> Decimal {
        Decimal::TWO * (self.width + self.height)
    }
}

/// Raw product attributes as scraped by the snapshot provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProductSnapshot {
    pub product_id: String,
    pub price: Decimal,
    pub dimensions: Dimensions,
    pub category: String,
    pub badges: BTreeSet<String>,
    pub fulfillment_types: Vec<String>,
    pub review_dates: Vec<NaiveDate>,
    /// Seller shown in the buy box, when the provider could read it.
    pub seller_name: Option<String>,
    pub hazardous: bool,
}

impl ProductSnapshot {
    pub fn new(product_id: &str, price: Decimal, dimensions: Dimensions, category: &str) -> Self {
        ProductSnapshot {
            product_id: product_id.to_string(),
            price,
            dimensions,
            category: category.to_string(),
            ..Default::default()
        }
    }

    pub fn is_platform_fulfilled(&self) -> bool {
        self.fulfillment_types
            .iter()
            .chain(self.badges.iter())
            .any(|value| contains_any(value, PLATFORM_FULFILLMENT_MARKERS))
    }

    pub fn is_apparel(&self) -> bool {
        let category = self.category.to_lowercase();
        category.contains("apparel") || category.contains("clothing")
    }

    pub fn is_hazardous(&self) -> bool {
        self.hazardous || self.badges.iter().any(|b| contains_any(b, HAZMAT_MARKERS))
    }

    /// Most recent review date, if any reviews were captured.
    pub fn latest_review(&self) -> Option<NaiveDate> {
        self.review_dates.iter().max().copied()
    }
}

fn contains_any(value: &str, markers: &[&str]) -> bool {
    let lower = value.to_lowercase();
    markers.iter().any(|m| lower.contains(m))
}

/// How an offer is sold and shipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferType {
    PlatformSold,
    PlatformFulfilled,
    PlatformFulfilledPro,
    SellerFulfilled,
    SellerFulfilledPro,
}

impl OfferType {
    pub fn from_flags(platform_fulfilled: bool, pro_seller: bool) -> Self {
        match (platform_fulfilled, pro_seller) {
            (true, true) => OfferType::PlatformFulfilledPro,
            (true, false) => OfferType::PlatformFulfilled,
            (false, true) => OfferType::SellerFulfilledPro,
            (false, false) => OfferType::SellerFulfilled,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OfferType::PlatformSold => "Platform",
            OfferType::PlatformFulfilled => "WFS",
            OfferType::PlatformFulfilledPro => "WFS Pro",
            OfferType::SellerFulfilled => "SF",
            OfferType::SellerFulfilledPro => "SF Pro",
        }
    }
}

impl fmt::Display for OfferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One competing seller's offer on the product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerOffer {
    pub seller_name: String,
    pub price: Option<Decimal>,
    pub price_display: String,
    pub offer_type: OfferType,
    pub arrival: Option<String>,
    pub available_quantity: u32,
}

impl SellerOffer {
    pub fn new(seller_name: &str, price: Option<Decimal>, offer_type: OfferType) -> Self {
        let price_display = price
            .map(|p| format!("${:.2}", p))
            .unwrap_or_else(|| "N/A".to_string());

        SellerOffer {
            seller_name: seller_name.to_string(),
            price,
            price_display,
            offer_type,
            arrival: None,
            available_quantity: 0,
        }
    }

    /// Offer with nothing but a name, used when price and arrival are unknown.
    pub fn minimal(seller_name: &str) -> Self {
        Self::new(seller_name, None, OfferType::SellerFulfilled)
    }
}

impl fmt::Display for SellerOffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] @ {}", self.seller_name, self.offer_type, self.price_display)
    }
}

/// Cached offers for one product with fetch time
#[derive(Debug, Clone)]
pub struct SellerCacheEntry {
    pub product_id: String,
    pub offers: Vec<SellerOffer>,
    pub fetched_at: Instant,
}

impl SellerCacheEntry {
    pub fn new(product_id: &str, offers: Vec<SellerOffer>) -> Self {
        SellerCacheEntry {
            product_id: product_id.to_string(),
            offers,
            fetched_at: Instant::now(),
        }
    }

    /// Fresh means same product and strictly younger than the TTL.
    pub fn is_fresh_for(&self, product_id: &str, ttl: Duration) -> bool {
        self.product_id == product_id && self.fetched_at.elapsed() < ttl
    }
}

/// Which fallback strategy produced a seller list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Cache,
    RemoteQuery,
    DomListing,
    SingleOffer,
    EmbeddedData,
    Synthesized,
    Unresolved,
}

impl Default for ResolutionSource {
    fn default() -> Self {
        ResolutionSource::Unresolved
    }
}

/// User-entered values that win over computed ones. `None` means derive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PricingOverrides {
    pub sale_price: Option<Decimal>,
    pub product_cost: Option<Decimal>,
    pub referral_fee: Option<Decimal>,
    pub fulfillment_fee: Option<Decimal>,
    pub prep_fee: Option<Decimal>,
    pub storage_fee: Option<Decimal>,
    pub inbound_shipping: Option<Decimal>,
    pub outbound_shipping: Option<Decimal>,
    pub additional_fees: Option<Decimal>,
    pub platform_fulfilled: Option<bool>,
    pub storage_months: Option<u32>,
}

/// Every fee component for one product, money rounded to cents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputedFees {
    pub referral_fee: Decimal,
    pub fulfillment_fee: Decimal,
    pub prep_fee: Decimal,
    pub storage_fee: Decimal,
    pub inbound_shipping: Decimal,
    pub outbound_shipping: Decimal,
    pub additional_fees: Decimal,
    pub shipping_weight_fulfillment: Decimal,
    pub shipping_weight_inbound: Decimal,
    pub dimensional_weight: Decimal,
    pub cubic_feet: Decimal,
    pub starting_product_cost: Decimal,
}

impl ComputedFees {
    /// Sum of the fees deducted from the sale price (outbound excluded).
    pub fn deducted_total(&self) -> Decimal {
        self.referral_fee
            + self.fulfillment_fee
            + self.inbound_shipping
            + self.storage_fee
            + self.prep_fee
            + self.additional_fees
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfitabilityResult {
    pub total_profit: Decimal,
    pub roi: Decimal,
    pub margin: Decimal,
}

/// Everything known about one product for one resolution cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedProductRecord {
    pub product_id: String,
    pub snapshot: ProductSnapshot,
    pub sale_price: Decimal,
    pub product_cost: Decimal,
    pub platform_fulfilled: bool,
    pub sellers: Vec<SellerOffer>,
    pub seller_count: usize,
    pub total_stock: u64,
    pub lowest_offer_price: Option<Decimal>,
    pub platform_seller_present: bool,
    pub seller_source: ResolutionSource,
    /// Most recent customer review, a rough signal of sales activity.
    pub latest_review: Option<NaiveDate>,
    pub fees: ComputedFees,
    pub profitability: ProfitabilityResult,
    /// Set when the product id or snapshot was missing.
    pub degraded: bool,
    pub resolved_at: DateTime<Utc>,
}
