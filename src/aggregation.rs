//! aggregation.rs - Merges snapshot, sellers, settings and fees into one record
//!
//! Field precedence is always: explicit override, then computed default, then
//! the raw snapshot value. Building a record cannot fail; missing inputs turn
//! into zero/empty values and the `degraded` flag.

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::ResolveError;
use crate::fee_schedule::FeeSchedule;
use crate::fees::FeeCalculator;
use crate::models::{AggregatedProductRecord, OfferType, PricingOverrides, ProductSnapshot, ResolutionSource};
use crate::page::SellerPage;
use crate::profitability;
use crate::seller_resolver::{ResolveContext, Resolution, SellerResolver};

/// Supplies the raw product attributes scraped from the page.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn snapshot(&self, product_id: &str) -> Result<ProductSnapshot, ResolveError>;
}

/// Supplies the fee schedule and per-product overrides.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn fee_schedule(&self) -> FeeSchedule;
    async fn overrides(&self, product_id: &str) -> PricingOverrides;
}

// ============================================================================
// In-memory collaborators
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemorySnapshots {
    snapshots: RwLock<HashMap<String, ProductSnapshot>>,
}

impl InMemorySnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, snapshot: ProductSnapshot) {
        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(snapshot.product_id.clone(), snapshot);
    }
}

#[async_trait]
impl SnapshotProvider for InMemorySnapshots {
    async fn snapshot(&self, product_id: &str) -> Result<ProductSnapshot, ResolveError> {
        let snapshots = self.snapshots.read().await;
        snapshots
            .get(product_id)
            .cloned()
            .ok_or_else(|| ResolveError::MissingData(format!("no snapshot for {}", product_id)))
    }
}

#[derive(Debug, Default)]
pub struct InMemorySettings {
    schedule: RwLock<FeeSchedule>,
    overrides: RwLock<HashMap<String, PricingOverrides>>,
}

impl InMemorySettings {
    pub fn new(schedule: FeeSchedule) -> Self {
        InMemorySettings {
            schedule: RwLock::new(schedule),
            overrides: RwLock::new(HashMap::new()),
        }
    }

    pub async fn set_schedule(&self, schedule: FeeSchedule) {
        *self.schedule.write().await = schedule;
    }

    pub async fn set_overrides(&self, product_id: &str, overrides: PricingOverrides) {
        let mut all = self.overrides.write().await;
        all.insert(product_id.to_string(), overrides);
    }
}

#[async_trait]
impl SettingsStore for InMemorySettings {
    async fn fee_schedule(&self) -> FeeSchedule {
        self.schedule.read().await.clone()
    }

    async fn overrides(&self, product_id: &str) -> PricingOverrides {
        let all = self.overrides.read().await;
        all.get(product_id).cloned().unwrap_or_default()
    }
}

// ============================================================================
// Record construction
// ============================================================================

/// Everything a record can be built from. Every input is optional.
#[derive(Clone, Copy, Default)]
pub struct RecordInputs<'a> {
    pub product_id: &'a str,
    pub snapshot: Option<&'a ProductSnapshot>,
    pub resolution: Option<&'a Resolution>,
    pub overrides: Option<&'a PricingOverrides>,
    pub schedule: Option<&'a FeeSchedule>,
}

pub fn build_record(inputs: RecordInputs<'_>) -> AggregatedProductRecord {
    let product_id = inputs.product_id.trim();
    let degraded = product_id.is_empty() || inputs.snapshot.is_none();

    let snapshot = inputs.snapshot.cloned().unwrap_or_else(|| ProductSnapshot {
        product_id: product_id.to_string(),
        ..ProductSnapshot::default()
    });
    let default_overrides = PricingOverrides::default();
    let overrides = inputs.overrides.unwrap_or(&default_overrides);
    let default_schedule;
    let schedule = match inputs.schedule {
        Some(schedule) => schedule,
        None => {
            default_schedule = FeeSchedule::default();
            &default_schedule
        }
    };

    let fees = FeeCalculator::new(schedule).compute(&snapshot, overrides);
    let sale_price = overrides.sale_price.unwrap_or(snapshot.price);
    let product_cost = fees.starting_product_cost;
    let platform_fulfilled = overrides
        .platform_fulfilled
        .unwrap_or_else(|| snapshot.is_platform_fulfilled());
    let profitability = profitability::evaluate(sale_price, product_cost, &fees);

    let (sellers, seller_source) = inputs
        .resolution
        .map(|r| (r.offers.clone(), r.source))
        .unwrap_or_else(|| (Vec::new(), ResolutionSource::Unresolved));
    let total_stock = sellers.iter().map(|o| u64::from(o.available_quantity)).sum();
    let lowest_offer_price = sellers
        .iter()
        .filter_map(|o| o.price)
        .filter(|p| *p > Decimal::ZERO)
        .min();
    let platform_seller_present = sellers.iter().any(|o| o.offer_type == OfferType::PlatformSold);
    let latest_review = snapshot.latest_review();

    AggregatedProductRecord {
        product_id: product_id.to_string(),
        snapshot,
        sale_price,
        product_cost,
        platform_fulfilled,
        seller_count: sellers.len(),
        sellers,
        total_stock,
        lowest_offer_price,
        platform_seller_present,
        seller_source,
        latest_review,
        fees,
        profitability,
        degraded,
        resolved_at: Utc::now(),
    }
}

// ============================================================================
// AggregationService
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum AggregationState {
    Idle,
    Loading { product_id: String },
    Ready(Arc<AggregatedProductRecord>),
    /// Degraded record built from whatever inputs succeeded.
    Error { record: Arc<AggregatedProductRecord>, reason: String },
}

impl AggregationState {
    pub fn record(&self) -> Option<&Arc<AggregatedProductRecord>> {
        match self {
            AggregationState::Ready(record) | AggregationState::Error { record, .. } => Some(record),
            AggregationState::Idle | AggregationState::Loading { .. } => None,
        }
    }
}

pub struct AggregationService {
    snapshots: Arc<dyn SnapshotProvider>,
    settings: Arc<dyn SettingsStore>,
    resolver: Arc<SellerResolver>,
    state: RwLock<AggregationState>,
    generation: AtomicU64,
}

impl AggregationService {
    pub fn new(
        snapshots: Arc<dyn SnapshotProvider>,
        settings: Arc<dyn SettingsStore>,
        resolver: Arc<SellerResolver>,
    ) -> Self {
        AggregationService {
            snapshots,
            settings,
            resolver,
            state: RwLock::new(AggregationState::Idle),
            generation: AtomicU64::new(0),
        }
    }

    pub async fn state(&self) -> AggregationState {
        self.state.read().await.clone()
    }

    /// Run one resolution cycle for the viewed product.
    ///
    /// Returns `None` when another `load` started meanwhile; that cycle's
    /// result is discarded and the newer one owns the state.
    pub async fn load(&self, product_id: &str, page: Option<&dyn SellerPage>) -> Option<Arc<AggregatedProductRecord>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let product_id = product_id.trim();

        *self.state.write().await = AggregationState::Loading { product_id: product_id.to_string() };

        if product_id.is_empty() {
            warn!("Aggregation requested without a product id");
            let record = Arc::new(build_record(RecordInputs::default()));
            let state = AggregationState::Error { record: record.clone(), reason: "missing product id".to_string() };
            return self.publish(generation, state).await.then_some(record);
        }

        let snapshot = self.snapshots.snapshot(product_id).await;
        let (snapshot, failure) = match snapshot {
            Ok(snapshot) => (Some(snapshot), None),
            Err(e) => {
                warn!("Snapshot unavailable for {}: {}", product_id, e);
                (None, Some(e.to_string()))
            }
        };

        let ctx = ResolveContext::new(snapshot.as_ref(), page);
        let resolution = self.resolver.resolve_detailed(product_id, &ctx).await;
        let schedule = self.settings.fee_schedule().await;
        let overrides = self.settings.overrides(product_id).await;

        let record = Arc::new(build_record(RecordInputs {
            product_id,
            snapshot: snapshot.as_ref(),
            resolution: Some(&resolution),
            overrides: Some(&overrides),
            schedule: Some(&schedule),
        }));

        let state = match failure {
            None => AggregationState::Ready(record.clone()),
            Some(reason) => AggregationState::Error { record: record.clone(), reason },
        };

        if self.publish(generation, state).await {
            info!(
                "Record ready for {}: {} seller(s), profit {}",
                product_id, record.seller_count, record.profitability.total_profit
            );
            Some(record)
        } else {
            None
        }
    }

    /// Install `state` unless a newer cycle has started.
    async fn publish(&self, generation: u64, state: AggregationState) -> bool {
        let mut current = self.state.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Discarding superseded resolution cycle #{}", generation);
            return false;
        }
        *current = state;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::models::{Dimensions, SellerOffer};
    use chrono::NaiveDate;
    use crate::offers_api::MockOffersTransport;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    const OFFERS_BODY: &str = r#"{"data":{"product":{"allOffers":[
        {"sellerDisplayName":"Walmart.com","priceInfo":{"currentPrice":{"priceString":"$30.00"}},
         "availabilityStatus":"IN_STOCK","fulfillmentOptions":[{"availableQuantity":20}]},
        {"sellerDisplayName":"Gadget Barn","priceInfo":{"currentPrice":{"priceString":"$28.50"}},
         "wfsEnabled":true,"availabilityStatus":"IN_STOCK","fulfillmentOptions":[{"availableQuantity":5}]}
    ]}}}"#;

    fn snapshot() -> ProductSnapshot {
        let mut snapshot = ProductSnapshot::new("123", dec!(30), Dimensions::new(dec!(10), dec!(8), dec!(4), dec!(2)), "Toys");
        snapshot.fulfillment_types.push("WFS".to_string());
        snapshot
    }

    /// Snapshot provider that answers after a per-product delay.
    struct SlowSnapshots {
        delays: HashMap<String, Duration>,
    }

    #[async_trait]
    impl SnapshotProvider for SlowSnapshots {
        async fn snapshot(&self, product_id: &str) -> Result<ProductSnapshot, ResolveError> {
            if let Some(delay) = self.delays.get(product_id) {
                tokio::time::sleep(*delay).await;
            }
            Ok(ProductSnapshot { product_id: product_id.to_string(), ..snapshot() })
        }
    }

    async fn service(snapshots: Arc<dyn SnapshotProvider>, settings: Arc<InMemorySettings>) -> AggregationService {
        let transport = Arc::new(MockOffersTransport::new().push(200, OFFERS_BODY));
        let resolver = Arc::new(SellerResolver::new(ResolverConfig::default(), transport));
        AggregationService::new(snapshots, settings, resolver)
    }

    #[test]
    fn test_build_record_with_nothing() {
        let record = build_record(RecordInputs::default());

        assert!(record.degraded);
        assert_eq!(record.seller_count, 0);
        assert_eq!(record.total_stock, 0);
        assert_eq!(record.lowest_offer_price, None);
        assert_eq!(record.seller_source, ResolutionSource::Unresolved);
        assert_eq!(record.profitability.total_profit, Decimal::ZERO);
        assert_eq!(record.profitability.roi, Decimal::ZERO);
        assert_eq!(record.profitability.margin, Decimal::ZERO);
    }

    #[test]
    fn test_build_record_empty_sellers_unset_overrides() {
        let snapshot = snapshot();
        let resolution = Resolution { offers: Vec::new(), source: ResolutionSource::Unresolved };
        let record = build_record(RecordInputs {
            product_id: "123",
            snapshot: Some(&snapshot),
            resolution: Some(&resolution),
            ..RecordInputs::default()
        });

        assert!(!record.degraded);
        assert_eq!(record.latest_review, None);
        assert_eq!(record.seller_count, 0);
        assert_eq!(record.total_stock, 0);
        assert!(!record.platform_seller_present);
        assert_eq!(record.product_cost, dec!(10.00));
        assert!(record.platform_fulfilled);
    }

    #[test]
    fn test_override_precedence() {
        let mut snapshot = snapshot();
        snapshot.review_dates = vec![
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 9, 12).unwrap(),
        ];
        let overrides = PricingOverrides {
            sale_price: Some(dec!(40)),
            product_cost: Some(dec!(12)),
            fulfillment_fee: Some(dec!(4)),
            platform_fulfilled: Some(true),
            ..PricingOverrides::default()
        };
        let record = build_record(RecordInputs {
            product_id: "123",
            snapshot: Some(&snapshot),
            overrides: Some(&overrides),
            ..RecordInputs::default()
        });

        assert_eq!(record.latest_review, NaiveDate::from_ymd_opt(2024, 9, 12));
        assert_eq!(record.sale_price, dec!(40));
        assert_eq!(record.product_cost, dec!(12));
        assert_eq!(record.fees.fulfillment_fee, dec!(4));
        // 40 * 15% referral on the overridden price
        assert_eq!(record.fees.referral_fee, dec!(6.00));
        // 40 - (12 + 6 + 4 + 1.00 inbound + 0.14 storage)
        assert_eq!(record.profitability.total_profit, dec!(16.86));
    }

    #[test]
    fn test_seller_summary_fields() {
        let mut platform = SellerOffer::new("Walmart.com", Some(dec!(30)), OfferType::PlatformSold);
        platform.available_quantity = 20;
        let mut third_party = SellerOffer::new("Gadget Barn", Some(dec!(28.50)), OfferType::PlatformFulfilled);
        third_party.available_quantity = 5;
        let unknown = SellerOffer::minimal("Inline Seller");

        let resolution = Resolution {
            offers: vec![platform, third_party, unknown],
            source: ResolutionSource::RemoteQuery,
        };
        let record = build_record(RecordInputs {
            product_id: "123",
            resolution: Some(&resolution),
            ..RecordInputs::default()
        });

        assert!(record.degraded);
        assert_eq!(record.seller_count, 3);
        assert_eq!(record.total_stock, 25);
        assert_eq!(record.lowest_offer_price, Some(dec!(28.50)));
        assert!(record.platform_seller_present);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_ready() {
        let snapshots = Arc::new(InMemorySnapshots::new());
        snapshots.insert(snapshot()).await;
        let settings = Arc::new(InMemorySettings::new(FeeSchedule::default()));
        let service = service(snapshots, settings).await;

        assert_eq!(service.state().await, AggregationState::Idle);
        let record = service.load("123", None).await.unwrap();

        assert_eq!(record.seller_source, ResolutionSource::RemoteQuery);
        assert_eq!(record.seller_count, 2);
        assert_eq!(record.total_stock, 25);
        assert!(matches!(service.state().await, AggregationState::Ready(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_missing_snapshot_is_degraded() {
        let snapshots = Arc::new(InMemorySnapshots::new());
        let settings = Arc::new(InMemorySettings::new(FeeSchedule::default()));
        let service = service(snapshots, settings).await;

        let record = service.load("999", None).await.unwrap();
        assert!(record.degraded);
        assert_eq!(record.seller_count, 2);

        match service.state().await {
            AggregationState::Error { record, reason } => {
                assert!(record.degraded);
                assert!(reason.contains("999"));
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_blank_product_id() {
        let snapshots = Arc::new(InMemorySnapshots::new());
        let settings = Arc::new(InMemorySettings::new(FeeSchedule::default()));
        let service = service(snapshots, settings).await;

        let record = service.load("  ", None).await.unwrap();
        assert!(record.degraded);
        assert_eq!(record.seller_count, 0);
        assert!(matches!(service.state().await, AggregationState::Error { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrides_from_settings_store() {
        let snapshots = Arc::new(InMemorySnapshots::new());
        snapshots.insert(snapshot()).await;
        let settings = Arc::new(InMemorySettings::new(FeeSchedule::default()));
        settings
            .set_overrides("123", PricingOverrides { product_cost: Some(dec!(5)), ..PricingOverrides::default() })
            .await;
        let service = service(snapshots, settings).await;

        let record = service.load("123", None).await.unwrap();
        assert_eq!(record.product_cost, dec!(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_product_change_discards_stale_cycle() {
        let delays = HashMap::from([("A".to_string(), Duration::from_secs(5))]);
        let snapshots = Arc::new(SlowSnapshots { delays });
        let settings = Arc::new(InMemorySettings::new(FeeSchedule::default()));
        let service = Arc::new(service(snapshots, settings).await);

        let first = tokio::spawn({
            let service = service.clone();
            async move { service.load("A", None).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = service.load("B", None).await;

        assert!(first.await.unwrap().is_none());
        assert_eq!(second.unwrap().product_id, "B");
        let state = service.state().await;
        assert_eq!(state.record().map(|r| r.product_id.as_str()), Some("B"));
    }
}
