//! fee_schedule.rs - User-configurable fee schedule
//!
//! The settings store hands this over as JSON; any field it omits falls back
//! to the marketplace's published defaults below.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Referral rate applied when no category rule matches.
pub const DEFAULT_REFERRAL_RATE: Decimal = Decimal::from_parts(15, 0, 0, false, 2);

/// `d(15, 2)` is 0.15
fn d(num: i64, scale: u32) -> Decimal {
    Decimal::new(num, scale)
}

/// One price band of a referral rule. `up_to: None` is the open top band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTier {
    pub up_to: Option<Decimal>,
    pub rate: Decimal,
}

impl RateTier {
    fn capped(up_to: Decimal, rate: Decimal) -> Self {
        RateTier { up_to: Some(up_to), rate }
    }

    fn open(rate: Decimal) -> Self {
        RateTier { up_to: None, rate }
    }
}

/// Referral rate rule for one category, optionally price-tiered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralRule {
    pub category: String,
    /// Extra lowercase substrings that route a scraped category here.
    #[serde(default)]
    pub keywords: Vec<String>,
    pub tiers: Vec<RateTier>,
}

impl ReferralRule {
    fn new(category: &str, keywords: &[&str], tiers: Vec<RateTier>) -> Self {
        ReferralRule {
            category: category.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            tiers,
        }
    }

    fn flat(category: &str, keywords: &[&str], rate: Decimal) -> Self {
        Self::new(category, keywords, vec![RateTier::open(rate)])
    }

    pub fn matches(&self, category: &str) -> bool {
        let category = category.trim().to_lowercase();
        if category.is_empty() {
            return false;
        }
        category == self.category.to_lowercase()
            || self.keywords.iter().any(|k| category.contains(k.as_str()))
    }

    /// Rate for a price: first tier whose cap is at or above the price.
    pub fn rate_for(&self, price: Decimal) -> Option<Decimal> {
        self.tiers
            .iter()
            .find(|tier| tier.up_to.map_or(true, |cap| price <= cap))
            .map(|tier| tier.rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    OffPeak,
    /// October through December
    Peak,
}

impl Season {
    pub fn for_month(month: u32) -> Self {
        if (10..=12).contains(&month) {
            Season::Peak
        } else {
            Season::OffPeak
        }
    }

    pub fn for_date(date: NaiveDate) -> Self {
        Self::for_month(date.month())
    }
}

impl Default for Season {
    fn default() -> Self {
        Season::OffPeak
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageRates {
    pub off_peak: Decimal,
    pub peak_first_month: Decimal,
    pub peak_extended: Decimal,
}

impl Default for StorageRates {
    fn default() -> Self {
        StorageRates {
            off_peak: d(75, 2),
            peak_first_month: d(75, 2),
            peak_extended: d(150, 2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostMode {
    PerPound,
    Flat,
}

/// Prep or miscellaneous cost: either `rate × weight` or a flat `rate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRate {
    pub rate: Decimal,
    pub mode: CostMode,
}

impl Default for CostRate {
    fn default() -> Self {
        CostRate { rate: Decimal::ZERO, mode: CostMode::Flat }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    pub referral_rules: Vec<ReferralRule>,
    pub default_referral_rate: Decimal,
    /// Per-pound inbound rate when the platform fulfills.
    pub inbound_rate_platform: Decimal,
    /// Per-pound inbound rate when the seller fulfills.
    pub inbound_rate_seller: Decimal,
    /// Per-pound outbound rate, seller-fulfilled only.
    pub outbound_rate: Decimal,
    pub storage: StorageRates,
    pub storage_season: Season,
    pub storage_months: u32,
    pub prep: CostRate,
    pub additional: CostRate,
}

impl FeeSchedule {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Referral rate for `category` at `price`, falling back to the default.
    pub fn referral_rate(&self, price: Decimal, category: &str) -> Decimal {
        self.referral_rules
            .iter()
            .find(|rule| rule.matches(category))
            .and_then(|rule| rule.rate_for(price))
            .unwrap_or(self.default_referral_rate)
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        FeeSchedule {
            referral_rules: default_referral_rules(),
            default_referral_rate: DEFAULT_REFERRAL_RATE,
            inbound_rate_platform: d(50, 2),
            inbound_rate_seller: Decimal::ZERO,
            outbound_rate: Decimal::ZERO,
            storage: StorageRates::default(),
            storage_season: Season::OffPeak,
            storage_months: 1,
            prep: CostRate::default(),
            additional: CostRate::default(),
        }
    }
}

/// Published category table. More specific categories come first since the
/// first matching rule wins.
fn default_referral_rules() -> Vec<ReferralRule> {
    let tiered = |category: &str, keywords: &[&str], cap: i64, low: i64, high: i64| {
        ReferralRule::new(
            category,
            keywords,
            vec![RateTier::capped(Decimal::from(cap), d(low, 2)), RateTier::open(d(high, 2))],
        )
    };

    vec![
        ReferralRule::new(
            "Apparel & Accessories",
            &["apparel", "clothing"],
            vec![
                RateTier::capped(Decimal::from(15), d(5, 2)),
                RateTier::capped(Decimal::from(20), d(10, 2)),
                RateTier::open(d(15, 2)),
            ],
        ),
        ReferralRule::flat("Automotive Electronics", &["automotive electronics"], d(15, 2)),
        ReferralRule::flat("Automotive & Powersports", &["automotive", "powersports"], d(12, 2)),
        tiered("Baby", &["baby"], 10, 8, 15),
        tiered("Beauty", &["beauty"], 10, 8, 15),
        ReferralRule::flat("Books", &["book"], d(15, 2)),
        ReferralRule::flat("Camera & Photo", &["camera", "photo"], d(8, 2)),
        ReferralRule::flat("Cell Phones", &["cell phone"], d(8, 2)),
        tiered("Electronics Accessories", &["electronics accessories"], 100, 15, 8),
        ReferralRule::flat("Consumer Electronics", &["electronics"], d(8, 2)),
        tiered("Furniture", &["furniture"], 200, 15, 10),
        tiered("Grocery", &["grocery"], 10, 8, 15),
        tiered("Health & Personal Care", &["health", "personal care"], 10, 8, 15),
        ReferralRule::flat("Industrial & Scientific", &["industrial", "scientific"], d(12, 2)),
        tiered("Jewelry", &["jewelry"], 250, 20, 5),
        ReferralRule::flat("Major Appliances", &["appliances"], d(8, 2)),
        ReferralRule::flat("Musical Instruments", &["musical instrument"], d(12, 2)),
        ReferralRule::flat("Personal Computers", &["computers"], d(6, 2)),
        ReferralRule::flat("Plumbing Heating Cooling", &["plumbing"], d(10, 2)),
        ReferralRule::flat("Tires & Wheels", &["tires"], d(10, 2)),
        ReferralRule::flat("Video Game Consoles", &["consoles"], d(8, 2)),
        tiered("Watches", &["watch"], 1500, 15, 3),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decimal_helper() {
        assert_eq!(d(15, 2), dec!(0.15));
        assert_eq!(d(150, 2), dec!(1.50));
    }

    #[test]
    fn test_apparel_tiers() {
        let schedule = FeeSchedule::default();
        assert_eq!(schedule.referral_rate(dec!(14.99), "Clothing"), dec!(0.05));
        assert_eq!(schedule.referral_rate(dec!(15.00), "Clothing"), dec!(0.05));
        assert_eq!(schedule.referral_rate(dec!(19.99), "Clothing"), dec!(0.10));
        assert_eq!(schedule.referral_rate(dec!(25), "Clothing"), dec!(0.15));
    }

    #[test]
    fn test_specific_rule_wins_over_generic() {
        let schedule = FeeSchedule::default();
        assert_eq!(schedule.referral_rate(dec!(50), "Electronics Accessories"), dec!(0.15));
        assert_eq!(schedule.referral_rate(dec!(150), "Electronics Accessories"), dec!(0.08));
        assert_eq!(schedule.referral_rate(dec!(50), "Electronics"), dec!(0.08));
    }

    #[test]
    fn test_unknown_category_uses_default() {
        let schedule = FeeSchedule::default();
        assert_eq!(schedule.referral_rate(dec!(42), "Garden Gnomes"), DEFAULT_REFERRAL_RATE);
        assert_eq!(schedule.referral_rate(dec!(42), ""), DEFAULT_REFERRAL_RATE);
    }

    #[test]
    fn test_season_for_month() {
        assert_eq!(Season::for_month(9), Season::OffPeak);
        assert_eq!(Season::for_month(10), Season::Peak);
        assert_eq!(Season::for_month(12), Season::Peak);
        assert_eq!(Season::for_month(1), Season::OffPeak);
    }

    #[test]
    fn test_season_for_date() {
        let date = |m| NaiveDate::from_ymd_opt(2024, m, 15).unwrap();
        assert_eq!(Season::for_date(date(11)), Season::Peak);
        assert_eq!(Season::for_date(date(6)), Season::OffPeak);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let schedule = FeeSchedule::from_json_str(
            r#"{"inbound_rate_platform": "0.65", "prep": {"rate": "1.25", "mode": "per_pound"}}"#,
        )
        .unwrap();

        assert_eq!(schedule.inbound_rate_platform, dec!(0.65));
        assert_eq!(schedule.prep.mode, CostMode::PerPound);
        assert_eq!(schedule.storage_months, 1);
        assert!(!schedule.referral_rules.is_empty());
    }
}
