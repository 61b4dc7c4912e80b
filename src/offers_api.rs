//! offers_api.rs - Remote structured query for a product's seller offers
//!
//! The endpoint takes a `variables` JSON query parameter and answers with
//! `{data:{product:{allOffers:[...]}}}`. Anti-automation blocks come back as
//! HTTP 412 or as a body carrying both a redirect URL and a "blocked" path.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, StatusCode, Url};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::ResolverConfig;
use crate::error::ResolveError;
use crate::models::{OfferType, SellerOffer};

const REDIRECT_MARKER: &str = "redirectUrl";
const BLOCKED_MARKER: &str = "blocked";
const CORRELATION_HEADER: &str = "x-o-correlation-id";

/// Raw HTTP answer before classification
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Anything that can run the offers query for a product id.
#[async_trait]
pub trait OffersTransport: Send + Sync {
    async fn fetch_offers(&self, product_id: &str, correlation_id: &str) -> Result<TransportResponse, ResolveError>;
}

// ============================================================================
// Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct OffersEnvelope {
    data: Option<OffersData>,
}

#[derive(Debug, Deserialize)]
struct OffersData {
    product: Option<ProductOffers>,
}

#[derive(Debug, Deserialize)]
struct ProductOffers {
    #[serde(rename = "allOffers", default)]
    all_offers: Vec<RawOffer>,
}

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum AvailabilityStatus {
    InStock,
    OutOfStock,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum FulfillmentType {
    Wfs,
    Seller,
    Marketplace,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct RawOffer {
    #[serde(rename = "sellerDisplayName")]
    seller_display_name: Option<String>,

    #[serde(rename = "sellerName")]
    seller_name: Option<String>,

    #[serde(rename = "priceInfo")]
    price_info: Option<PriceInfo>,

    #[serde(rename = "wfsEnabled")]
    wfs_enabled: Option<bool>,

    #[serde(rename = "fulfillmentType")]
    fulfillment_type: Option<FulfillmentType>,

    #[serde(rename = "hasSellerBadge", default)]
    has_seller_badge: bool,

    #[serde(rename = "shippingOption")]
    shipping_option: Option<ShippingOption>,

    #[serde(rename = "availabilityStatus")]
    availability_status: Option<AvailabilityStatus>,

    #[serde(rename = "fulfillmentOptions", default)]
    fulfillment_options: Vec<FulfillmentOption>,
}

#[derive(Debug, Deserialize)]
struct PriceInfo {
    #[serde(rename = "currentPrice")]
    current_price: Option<CurrentPrice>,
}

#[derive(Debug, Deserialize)]
struct CurrentPrice {
    #[serde(rename = "priceString")]
    price_string: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShippingOption {
    #[serde(rename = "deliveryDate")]
    delivery_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FulfillmentOption {
    #[serde(rename = "availableQuantity")]
    available_quantity: Option<u32>,
}

impl RawOffer {
    fn is_in_stock(&self) -> bool {
        self.availability_status == Some(AvailabilityStatus::InStock)
    }

    fn is_platform_fulfilled(&self) -> bool {
        match (self.wfs_enabled, self.fulfillment_type) {
            (Some(enabled), _) => enabled,
            (None, Some(FulfillmentType::Wfs)) => true,
            (None, Some(FulfillmentType::Seller | FulfillmentType::Marketplace | FulfillmentType::Other)) => false,
            (None, None) => false,
        }
    }

    fn into_offer(self, platform_seller_name: &str) -> Option<SellerOffer> {
        let platform_fulfilled = self.is_platform_fulfilled();
        let available_quantity = self
            .fulfillment_options
            .first()
            .and_then(|o| o.available_quantity)
            .unwrap_or(0);
        let arrival = self.shipping_option.and_then(|s| s.delivery_date);
        let price_display = self
            .price_info
            .and_then(|p| p.current_price)
            .and_then(|c| c.price_string);

        let name = self
            .seller_display_name
            .or(self.seller_name)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())?;

        let offer_type = if name.eq_ignore_ascii_case(platform_seller_name) {
            OfferType::PlatformSold
        } else {
            OfferType::from_flags(platform_fulfilled, self.has_seller_badge)
        };

        let price = price_display.as_deref().and_then(parse_price);
        let mut offer = SellerOffer::new(&name, price, offer_type);
        if let Some(display) = price_display {
            offer.price_display = display;
        }
        offer.arrival = arrival;
        offer.available_quantity = available_quantity;
        Some(offer)
    }
}

/// Parse a display price such as "$1,299.99" or "Now $12.50".
pub fn parse_price(text: &str) -> Option<Decimal> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .filter(|c| *c != ',')
        .collect();
    Decimal::from_str(digits.trim_end_matches('.')).ok()
}

/// True for HTTP 412 or a redirect-to-blocked body.
pub fn is_block_signal(status: u16, body: &str) -> bool {
    status == StatusCode::PRECONDITION_FAILED.as_u16() || (body.contains(REDIRECT_MARKER) && body.contains(BLOCKED_MARKER))
}

/// Classify a raw response and normalize its in-stock offers.
pub fn interpret_response(response: &TransportResponse, platform_seller_name: &str) -> Result<Vec<SellerOffer>, ResolveError> {
    if is_block_signal(response.status, &response.body) {
        return Err(ResolveError::Blocked { status: response.status });
    }
    if !(200..300).contains(&response.status) {
        return Err(ResolveError::Network(format!("offers endpoint returned status {}", response.status)));
    }

    let envelope: OffersEnvelope = serde_json::from_str(&response.body)?;
    let raw_offers = envelope
        .data
        .and_then(|d| d.product)
        .map(|p| p.all_offers)
        .ok_or_else(|| ResolveError::Parse("response has no data.product".to_string()))?;

    let total = raw_offers.len();
    let offers: Vec<SellerOffer> = raw_offers
        .into_iter()
        .filter(RawOffer::is_in_stock)
        .filter_map(|raw| raw.into_offer(platform_seller_name))
        .collect();

    debug!("Offers response: {} offers, {} in stock", total, offers.len());
    Ok(offers)
}

// ============================================================================
// HttpOffersTransport - reqwest-backed transport
// ============================================================================

#[derive(Debug, Clone)]
pub struct HttpOffersTransport {
    client: Client,
    endpoint: Url,
}

impl HttpOffersTransport {
    pub fn new(config: &ResolverConfig) -> Result<Self, ResolveError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| ResolveError::Network(format!("invalid endpoint '{}': {}", config.endpoint, e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert("x-o-platform", HeaderValue::from_static("rweb"));

        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(HttpOffersTransport { client, endpoint })
    }

    fn url_for(&self, product_id: &str) -> Url {
        let variables = serde_json::json!({
            "itemId": product_id,
            "isSubscriptionEligible": true,
        });
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("variables", &variables.to_string());
        url
    }
}

#[async_trait]
impl OffersTransport for HttpOffersTransport {
    async fn fetch_offers(&self, product_id: &str, correlation_id: &str) -> Result<TransportResponse, ResolveError> {
        let url = self.url_for(product_id);
        debug!("Fetching offers from: {}", url);

        let response = self
            .client
            .get(url)
            .header(CORRELATION_HEADER, correlation_id)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(TransportResponse { status, body })
    }
}

// ============================================================================
// MockOffersTransport - For testing purposes
// ============================================================================

/// Scripted transport: replays queued responses, then repeats the last one.
#[derive(Debug, Default)]
pub struct MockOffersTransport {
    responses: Mutex<VecDeque<TransportResponse>>,
    last: Mutex<Option<TransportResponse>>,
    /// Simulated latency per product.
    delays: HashMap<String, Duration>,
    calls: AtomicUsize,
}

impl MockOffersTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response; calls past the end of the queue repeat the last one.
    pub fn push(self, status: u16, body: &str) -> Self {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(TransportResponse { status, body: body.to_string() });
        }
        self
    }

    /// Answer requests for `product_id` only after `delay`.
    pub fn with_delay(mut self, product_id: &str, delay: Duration) -> Self {
        self.delays.insert(product_id.to_string(), delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OffersTransport for MockOffersTransport {
    async fn fetch_offers(&self, product_id: &str, _correlation_id: &str) -> Result<TransportResponse, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        debug!("MockOffersTransport fetch for {}", product_id);
        if let Some(delay) = self.delays.get(product_id) {
            tokio::time::sleep(*delay).await;
        }

        let next = self.responses.lock().ok().and_then(|mut q| q.pop_front());
        let mut last = self
            .last
            .lock()
            .map_err(|_| ResolveError::Network("mock transport poisoned".to_string()))?;
        if let Some(response) = next {
            *last = Some(response);
        }
        last.clone()
            .ok_or_else(|| ResolveError::Network("mock transport has no responses".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = r#"{
        "data": {"product": {"allOffers": [
            {"sellerDisplayName": "Walmart.com", "priceInfo": {"currentPrice": {"priceString": "$19.97"}},
             "wfsEnabled": false, "availabilityStatus": "IN_STOCK",
             "fulfillmentOptions": [{"availableQuantity": 12}]},
            {"sellerName": "Gadget Barn", "priceInfo": {"currentPrice": {"priceString": "$21.49"}},
             "fulfillmentType": "WFS", "hasSellerBadge": true, "availabilityStatus": "IN_STOCK",
             "shippingOption": {"deliveryDate": "Arrives Tue, Oct 21"},
             "fulfillmentOptions": [{"availableQuantity": 3}]},
            {"sellerDisplayName": "Sold Out Co", "priceInfo": {"currentPrice": {"priceString": "$18.00"}},
             "availabilityStatus": "OUT_OF_STOCK"},
            {"sellerDisplayName": "Odd Status", "availabilityStatus": "LIMITED_STOCK"},
            {"sellerDisplayName": "Home Shipper", "priceInfo": {"currentPrice": {"priceString": "$1,020.00"}},
             "wfsEnabled": false, "availabilityStatus": "IN_STOCK"}
        ]}}
    }"#;

    fn ok(body: &str) -> TransportResponse {
        TransportResponse { status: 200, body: body.to_string() }
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("$19.97"), Some(dec!(19.97)));
        assert_eq!(parse_price("Now $1,299.00"), Some(dec!(1299.00)));
        assert_eq!(parse_price("$5."), Some(dec!(5)));
        assert_eq!(parse_price("Price unavailable"), None);
    }

    #[test]
    fn test_block_detection() {
        assert!(is_block_signal(412, ""));
        assert!(is_block_signal(200, r#"{"redirectUrl":"/blocked?url=abc"}"#));
        assert!(!is_block_signal(200, r#"{"redirectUrl":"/ip/123"}"#));
        assert!(!is_block_signal(200, SAMPLE));
    }

    #[test]
    fn test_interpret_keeps_only_in_stock() {
        let offers = interpret_response(&ok(SAMPLE), "Walmart.com").unwrap();
        let names: Vec<&str> = offers.iter().map(|o| o.seller_name.as_str()).collect();
        assert_eq!(names, vec!["Walmart.com", "Gadget Barn", "Home Shipper"]);

        assert_eq!(offers[0].offer_type, OfferType::PlatformSold);
        assert_eq!(offers[0].available_quantity, 12);

        assert_eq!(offers[1].offer_type, OfferType::PlatformFulfilledPro);
        assert_eq!(offers[1].price, Some(dec!(21.49)));
        assert_eq!(offers[1].arrival.as_deref(), Some("Arrives Tue, Oct 21"));

        assert_eq!(offers[2].offer_type, OfferType::SellerFulfilled);
        assert_eq!(offers[2].price_display, "$1,020.00");
        assert_eq!(offers[2].price, Some(dec!(1020.00)));
    }

    #[test]
    fn test_interpret_errors() {
        let blocked = TransportResponse { status: 412, body: String::new() };
        assert!(interpret_response(&blocked, "Walmart.com").unwrap_err().is_blocked());

        let server = TransportResponse { status: 503, body: String::new() };
        assert!(matches!(interpret_response(&server, "Walmart.com"), Err(ResolveError::Network(_))));

        assert!(matches!(interpret_response(&ok("<html>"), "Walmart.com"), Err(ResolveError::Parse(_))));
        assert!(matches!(interpret_response(&ok(r#"{"data":null}"#), "Walmart.com"), Err(ResolveError::Parse(_))));
    }

    #[test]
    fn test_url_carries_variables() {
        let transport = HttpOffersTransport::new(&ResolverConfig::default()).unwrap();
        let url = transport.url_for("5551212");
        let (key, value) = url.query_pairs().next().unwrap();

        assert_eq!(key, "variables");
        let variables: serde_json::Value = serde_json::from_str(&value).unwrap();
        assert_eq!(variables["itemId"], "5551212");
        assert_eq!(variables["isSubscriptionEligible"], true);
    }
}
