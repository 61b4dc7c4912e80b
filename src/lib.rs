//! Seller Profit Core
//!
//! Competing-seller resolution and profitability engine for marketplace
//! product pages.
//!
//! # Components
//! - SellerResolver: ordered fallback chain with a short-lived cache,
//!   request jitter and block backoff
//! - FeeCalculator: referral, fulfillment, storage and shipping fees
//! - AggregationService: merges snapshot, sellers, settings and fees
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                AggregationService                    │
//! │  (one resolution cycle per viewed product)           │
//! └───────┬──────────────────┬──────────────────┬───────┘
//!         │                  │                  │
//!         ▼                  ▼                  ▼
//! ┌───────────────┐  ┌───────────────┐  ┌───────────────┐
//! │SnapshotProvider│ │SellerResolver │  │ SettingsStore │
//! └───────────────┘  └───────┬───────┘  └───────┬───────┘
//!                            │                  │
//!          ┌─────────────────┴─────┐            ▼
//!          │                       │    ┌───────────────┐
//!          ▼                       ▼    │ FeeCalculator │
//! ┌─────────────────┐   ┌─────────────────┐└─────────────┘
//! │ OffersTransport │   │   SellerPage    │
//! │ (Http / Mock)   │   │ (DOM fallbacks) │
//! └─────────────────┘   └─────────────────┘
//! ```

pub mod aggregation;
pub mod backoff;
pub mod config;
pub mod dom_extract;
pub mod error;
pub mod fee_schedule;
pub mod fees;
pub mod models;
pub mod offers_api;
pub mod page;
pub mod profitability;
pub mod seller_resolver;

// Re-export commonly used types
pub use aggregation::{
    build_record,
    AggregationService,
    AggregationState,
    InMemorySettings,
    InMemorySnapshots,
    RecordInputs,
    SettingsStore,
    SnapshotProvider,
};
pub use config::{ResolverConfig, ResolverOverrides};
pub use error::ResolveError;
pub use fee_schedule::{FeeSchedule, Season};
pub use fees::FeeCalculator;
pub use models::{
    AggregatedProductRecord,
    ComputedFees,
    Dimensions,
    OfferType,
    PricingOverrides,
    ProductSnapshot,
    ProfitabilityResult,
    ResolutionSource,
    SellerOffer,
};
pub use offers_api::{HttpOffersTransport, MockOffersTransport, OffersTransport};
pub use page::{Locator, PageNode, SellerPage, StaticPage};
pub use seller_resolver::{Resolution, ResolveContext, SellerResolver};

/// Version of the engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the package
pub const NAME: &str = env!("CARGO_PKG_NAME");
