//! seller_resolver.rs - Resolves the competing-seller list for a product
//!
//! Strategies run in a fixed order and the first one that yields offers
//! wins:
//!
//! ```text
//! cache -> remote query -> DOM listing -> single offer -> embedded data -> synthesized
//! ```
//!
//! Failures inside a strategy are logged and skipped. `resolve` itself never
//! fails.

use log::{debug, info, warn};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use crate::backoff::{self, BackoffState};
use crate::config::ResolverConfig;
use crate::dom_extract::{
    extract_offer, scan_seller_names, CONTAINER_LOCATORS, ROW_LOCATORS, SELLER_INFO_LOCATORS, SHOW_ALL_LOCATORS,
};
use crate::error::ResolveError;
use crate::models::{OfferType, ProductSnapshot, ResolutionSource, SellerCacheEntry, SellerOffer};
use crate::offers_api::{interpret_response, is_block_signal, HttpOffersTransport, OffersTransport};
use crate::page::{PageNode, SellerPage};

pub const UNKNOWN_SELLER: &str = "Unknown Seller";

/// One step of the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Cache,
    RemoteQuery,
    DomListing,
    SingleOffer,
    EmbeddedData,
    Synthesized,
}

/// Order in which strategies are attempted.
pub const FALLBACK_CHAIN: [Strategy; 6] = [
    Strategy::Cache,
    Strategy::RemoteQuery,
    Strategy::DomListing,
    Strategy::SingleOffer,
    Strategy::EmbeddedData,
    Strategy::Synthesized,
];

impl Strategy {
    pub fn source(&self) -> ResolutionSource {
        match self {
            Strategy::Cache => ResolutionSource::Cache,
            Strategy::RemoteQuery => ResolutionSource::RemoteQuery,
            Strategy::DomListing => ResolutionSource::DomListing,
            Strategy::SingleOffer => ResolutionSource::SingleOffer,
            Strategy::EmbeddedData => ResolutionSource::EmbeddedData,
            Strategy::Synthesized => ResolutionSource::Synthesized,
        }
    }
}

/// Optional inputs for one resolution cycle.
#[derive(Clone, Copy, Default)]
pub struct ResolveContext<'a> {
    /// Used by the terminal fallback.
    pub snapshot: Option<&'a ProductSnapshot>,
    /// Used by the DOM and embedded-data strategies.
    pub page: Option<&'a dyn SellerPage>,
}

impl<'a> ResolveContext<'a> {
    pub fn new(snapshot: Option<&'a ProductSnapshot>, page: Option<&'a dyn SellerPage>) -> Self {
        ResolveContext { snapshot, page }
    }

    fn page(&self) -> Result<&'a dyn SellerPage, ResolveError> {
        self.page
            .ok_or_else(|| ResolveError::MissingData("no page attached".to_string()))
    }
}

/// Offers plus the strategy that produced them
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub offers: Vec<SellerOffer>,
    pub source: ResolutionSource,
}

impl Resolution {
    fn empty() -> Self {
        Resolution { offers: Vec::new(), source: ResolutionSource::Unresolved }
    }
}

type Outcome = Result<Vec<SellerOffer>, ResolveError>;

/// Serializes remote queries for one product and remembers the last answer,
/// failures included, for callers that queued behind it.
#[derive(Default)]
struct RequestGate {
    completed: AtomicU64,
    last: Mutex<Option<Outcome>>,
}

pub struct SellerResolver {
    config: ResolverConfig,
    transport: Arc<dyn OffersTransport>,
    cache: RwLock<Option<SellerCacheEntry>>,
    /// Per-product gate so concurrent callers share one remote request.
    in_flight: Mutex<HashMap<String, Arc<RequestGate>>>,
    backoff: Mutex<BackoffState>,
    last_activation: Mutex<Option<Instant>>,
}

impl SellerResolver {
    pub fn new(config: ResolverConfig, transport: Arc<dyn OffersTransport>) -> Self {
        SellerResolver {
            config,
            transport,
            cache: RwLock::new(None),
            in_flight: Mutex::new(HashMap::new()),
            backoff: Mutex::new(BackoffState::new()),
            last_activation: Mutex::new(None),
        }
    }

    /// Resolver talking to the real offers endpoint.
    pub fn with_http(config: ResolverConfig) -> Result<Self, ResolveError> {
        let transport = HttpOffersTransport::new(&config)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Offers for `product_id`, without page or snapshot context.
    pub async fn resolve(&self, product_id: &str) -> Vec<SellerOffer> {
        self.resolve_with(product_id, &ResolveContext::default()).await
    }

    pub async fn resolve_with(&self, product_id: &str, ctx: &ResolveContext<'_>) -> Vec<SellerOffer> {
        self.resolve_detailed(product_id, ctx).await.offers
    }

    /// Run the fallback chain and report which strategy answered.
    pub async fn resolve_detailed(&self, product_id: &str, ctx: &ResolveContext<'_>) -> Resolution {
        let product_id = product_id.trim();
        if product_id.is_empty() {
            warn!("resolve called without a product id");
            return Resolution::empty();
        }

        for strategy in FALLBACK_CHAIN {
            match self.run_strategy(strategy, product_id, ctx).await {
                Ok(offers) if !offers.is_empty() => {
                    info!("Resolved {} seller(s) for {} via {:?}", offers.len(), product_id, strategy);
                    return Resolution { offers, source: strategy.source() };
                }
                Ok(_) => debug!("{:?} found no sellers for {}", strategy, product_id),
                Err(ResolveError::MissingData(reason)) => debug!("{:?} skipped: {}", strategy, reason),
                Err(e) => warn!("{:?} failed for {}: {}", strategy, product_id, e),
            }
        }

        Resolution::empty()
    }

    async fn run_strategy(
        &self,
        strategy: Strategy,
        product_id: &str,
        ctx: &ResolveContext<'_>,
    ) -> Result<Vec<SellerOffer>, ResolveError> {
        match strategy {
            Strategy::Cache => Ok(self.cached(product_id).await.unwrap_or_default()),
            Strategy::RemoteQuery => self.query_remote(product_id).await,
            Strategy::DomListing => self.scan_listing(ctx.page()?).await,
            Strategy::SingleOffer => self.single_offer(ctx.page()?),
            Strategy::EmbeddedData => Ok(embedded_offers(ctx.page()?)),
            Strategy::Synthesized => Ok(vec![self.synthesize(ctx.snapshot)]),
        }
    }

    // ========================================================================
    // Cache
    // ========================================================================

    /// Fresh cached offers for this product, possibly empty.
    pub async fn cached(&self, product_id: &str) -> Option<Vec<SellerOffer>> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|entry| entry.is_fresh_for(product_id, self.config.cache_ttl))
            .map(|entry| entry.offers.clone())
    }

    pub async fn invalidate(&self, product_id: &str) {
        let mut cache = self.cache.write().await;
        if cache.as_ref().map_or(false, |e| e.product_id == product_id) {
            *cache = None;
            debug!("Seller cache invalidated for {}", product_id);
        }
    }

    /// Cache `offers` unless another product was fetched after this request began.
    async fn store(&self, product_id: &str, offers: &[SellerOffer], requested_at: Instant) {
        let mut cache = self.cache.write().await;
        if let Some(entry) = cache.as_ref() {
            if entry.product_id != product_id && entry.fetched_at > requested_at {
                debug!("Not caching superseded offers for {}; {} is newer", product_id, entry.product_id);
                return;
            }
        }
        *cache = Some(SellerCacheEntry::new(product_id, offers.to_vec()));
    }

    // ========================================================================
    // Remote query + backoff
    // ========================================================================

    async fn gate_for(&self, product_id: &str) -> Arc<RequestGate> {
        let mut in_flight = self.in_flight.lock().await;
        // Only the current product needs a gate.
        in_flight.retain(|id, gate| id == product_id || Arc::strong_count(gate) > 1);
        in_flight
            .entry(product_id.to_string())
            .or_default()
            .clone()
    }

    async fn query_remote(&self, product_id: &str) -> Outcome {
        let gate = self.gate_for(product_id).await;
        let seen = gate.completed.load(Ordering::SeqCst);
        let mut last = gate.last.lock().await;

        // A request that finished while we waited answers for us, even a failed one.
        if gate.completed.load(Ordering::SeqCst) != seen {
            if let Some(outcome) = last.as_ref() {
                debug!("Remote query for {} answered by a concurrent request", product_id);
                return outcome.clone();
            }
        }
        if let Some(offers) = self.cached(product_id).await {
            return Ok(offers);
        }

        let outcome = self.fetch_remote(product_id).await;
        *last = Some(outcome.clone());
        gate.completed.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    async fn fetch_remote(&self, product_id: &str) -> Outcome {
        let requested_at = Instant::now();
        let jitter = backoff::random_between(self.config.jitter_min, self.config.jitter_max);
        debug!("Waiting {:?} before querying offers for {}", jitter, product_id);
        tokio::time::sleep(jitter).await;

        let correlation_id = Uuid::new_v4().to_string();
        let response = self.transport.fetch_offers(product_id, &correlation_id).await?;

        if is_block_signal(response.status, &response.body) {
            self.back_off().await;
            return Err(ResolveError::Blocked { status: response.status });
        }

        self.reset_backoff().await;
        let offers = interpret_response(&response, &self.config.platform_seller_name)?;
        self.store(product_id, &offers, requested_at).await;
        Ok(offers)
    }

    async fn back_off(&self) {
        let (blocks, previous) = {
            let mut state = self.backoff.lock().await;
            let previous = state.last_backoff_at();
            (state.record_block(), previous)
        };
        if let Some(at) = previous {
            debug!("Previous backoff started {:?} ago", at.elapsed());
        }
        let base = backoff::random_between(self.config.backoff_min, self.config.backoff_max);
        let delay = backoff::backoff_delay(base, blocks, self.config.backoff_cap_exponent);

        warn!("Offers endpoint blocked us ({} in a row); backing off for {:?}", blocks, delay);
        tokio::time::sleep(delay).await;
    }

    pub async fn reset_backoff(&self) {
        self.backoff.lock().await.reset();
    }

    pub async fn consecutive_blocks(&self) -> u32 {
        self.backoff.lock().await.consecutive_blocks()
    }

    /// When the most recent backoff began, if the endpoint ever blocked us.
    pub async fn last_backoff_at(&self) -> Option<Instant> {
        self.backoff.lock().await.last_backoff_at()
    }

    // ========================================================================
    // DOM strategies
    // ========================================================================

    /// Click "show all sellers" unless it was clicked within the cooldown.
    async fn activate_show_all(&self, page: &dyn SellerPage, root: &PageNode) -> bool {
        let Some(locator) = SHOW_ALL_LOCATORS.iter().find(|l| root.find_first(l).is_some()) else {
            return false;
        };

        let mut last = self.last_activation.lock().await;
        if last.map_or(false, |at| at.elapsed() < self.config.activation_cooldown) {
            debug!("Show-all control activated recently; not clicking again");
            return false;
        }

        let activated = page.activate(locator);
        if activated {
            *last = Some(Instant::now());
            debug!("Activated show-all control {:?}", locator);
        }
        activated
    }

    async fn scan_listing(&self, page: &dyn SellerPage) -> Result<Vec<SellerOffer>, ResolveError> {
        let activated = self.activate_show_all(page, &page.root()).await;
        let attempts = if activated { self.config.dom_wait_attempts.max(1) } else { 1 };

        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.config.dom_wait_interval).await;
            }
            if let Some(offers) = listing_offers(&page.root(), &self.config.platform_seller_name) {
                return Ok(offers);
            }
        }

        Err(ResolveError::Parse("seller listing not found".to_string()))
    }

    fn single_offer(&self, page: &dyn SellerPage) -> Result<Vec<SellerOffer>, ResolveError> {
        let root = page.root();
        let candidates = SELLER_INFO_LOCATORS
            .iter()
            .map(|l| root.find_all_outside(l, CONTAINER_LOCATORS))
            .find(|found| !found.is_empty())
            .unwrap_or_default();

        match candidates.as_slice() {
            [only] => Ok(extract_offer(only, &self.config.platform_seller_name).into_iter().collect()),
            [] => Ok(Vec::new()),
            many => Err(ResolveError::Parse(format!("{} seller-info blocks, expected one", many.len()))),
        }
    }

    // ========================================================================
    // Terminal fallback
    // ========================================================================

    fn synthesize(&self, snapshot: Option<&ProductSnapshot>) -> SellerOffer {
        let Some(snapshot) = snapshot else {
            return SellerOffer::minimal(UNKNOWN_SELLER);
        };

        let name = snapshot
            .seller_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(UNKNOWN_SELLER);
        let price = Some(snapshot.price).filter(|p| *p > Decimal::ZERO);
        let offer_type = if name.eq_ignore_ascii_case(&self.config.platform_seller_name) {
            OfferType::PlatformSold
        } else {
            OfferType::from_flags(snapshot.is_platform_fulfilled(), false)
        };

        SellerOffer::new(name, price, offer_type)
    }
}

/// Offers from the first container/row locator pair that yields rows.
fn listing_offers(root: &PageNode, platform_seller_name: &str) -> Option<Vec<SellerOffer>> {
    let container = root.find_first_of(CONTAINER_LOCATORS)?;
    let rows = ROW_LOCATORS
        .iter()
        .map(|l| container.find_all(l))
        .find(|rows| !rows.is_empty())?;

    let mut offers: Vec<SellerOffer> = Vec::new();
    for offer in rows.into_iter().filter_map(|row| extract_offer(row, platform_seller_name)) {
        if !offers.iter().any(|o| o.seller_name == offer.seller_name) {
            offers.push(offer);
        }
    }
    Some(offers)
}

fn embedded_offers(page: &dyn SellerPage) -> Vec<SellerOffer> {
    scan_seller_names(&page.inline_scripts())
        .iter()
        .map(|name| SellerOffer::minimal(name))
        .collect()
}
