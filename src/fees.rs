//! fees.rs - Pure fee calculations
//!
//! Every function here is deterministic: the same snapshot, overrides and
//! schedule always produce the same `ComputedFees`. Money is rounded half-up
//! to cents.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::fee_schedule::{CostMode, CostRate, FeeSchedule, Season, StorageRates};
use crate::models::{ComputedFees, Dimensions, PricingOverrides, ProductSnapshot};

/// Cubic inches per dimensional pound
const DIM_DIVISOR: i64 = 166;

/// Cubic inches per cubic foot
const CUBIC_INCHES_PER_FOOT: i64 = 1728;

/// Weight bands: (band ceiling lb, base amount in cents, per-pound floor lb).
/// A band without a floor has no per-pound increment.
const WEIGHT_BANDS: &[(Option<i64>, i64, Option<i64>)] = &[
    (Some(1), 345, None),
    (Some(2), 495, None),
    (Some(3), 545, None),
    (Some(20), 575, Some(4)),
    (Some(30), 1555, Some(21)),
    (Some(50), 1455, Some(31)),
    (None, 1755, Some(51)),
];

fn cents(value: i64) -> Decimal {
    Decimal::new(value, 2)
}

/// Round half-up to two decimal places.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn dimensional_weight(dims: &Dimensions) -> Decimal {
    dims.volume() / Decimal::from(DIM_DIVISOR)
}

pub fn cubic_feet(dims: &Dimensions) -> Decimal {
    dims.volume() / Decimal::from(CUBIC_INCHES_PER_FOOT)
}

pub fn is_big_and_bulky(dims: &Dimensions) -> bool {
    let longest = dims.longest();
    dims.weight > Decimal::from(150)
        || (longest > Decimal::from(108) && longest <= Decimal::from(120))
        || longest + dims.girth() > Decimal::from(165)
}

pub fn is_oversize(dims: &Dimensions) -> bool {
    let longest = dims.longest();
    let length_plus_girth = longest + dims.girth();
    (longest > Decimal::from(48) && longest <= Decimal::from(96))
        || dims.median() > Decimal::from(30)
        || (length_plus_girth > Decimal::from(105) && length_plus_girth <= Decimal::from(130))
}

pub fn is_additional_oversize(dims: &Dimensions) -> bool {
    let longest = dims.longest();
    let length_plus_girth = longest + dims.girth();
    (longest > Decimal::from(96) && longest <= Decimal::from(108))
        || (length_plus_girth > Decimal::from(130) && length_plus_girth <= Decimal::from(165))
}

/// Weight-banded base fulfillment fee for a shipping weight.
pub fn base_fulfillment_fee(shipping_weight: Decimal) -> Decimal {
    for &(ceiling, base, floor) in WEIGHT_BANDS {
        if ceiling.map_or(true, |c| shipping_weight <= Decimal::from(c)) {
            let increment = floor
                .map(|f| (shipping_weight - Decimal::from(f)).max(Decimal::ZERO) * cents(40))
                .unwrap_or(Decimal::ZERO);
            return cents(base) + increment;
        }
    }
    Decimal::ZERO
}

/// Big & bulky fee: $155 plus $0.80 per pound over 90.
pub fn big_and_bulky_fee(weight: Decimal) -> Decimal {
    Decimal::from(155) + (weight - Decimal::from(90)).max(Decimal::ZERO) * cents(80)
}

/// Billable weight for the fulfillment fee, rounded up to a whole pound.
pub fn shipping_weight_fulfillment(dims: &Dimensions) -> Decimal {
    let packaging = cents(25);
    if is_big_and_bulky(dims) {
        return (dims.weight + packaging).ceil();
    }
    let billable = if dims.weight < Decimal::ONE {
        dims.weight
    } else {
        dims.weight.max(dimensional_weight(dims))
    };
    (billable + packaging).ceil()
}

pub fn shipping_weight_inbound(dims: &Dimensions) -> Decimal {
    dims.weight.max(dimensional_weight(dims))
}

/// Peak season bills the extended rate once storage runs past one month.
pub fn storage_fee(rates: &StorageRates, season: Season, cubic_feet: Decimal, months: u32) -> Decimal {
    let rate = match season {
        Season::OffPeak => rates.off_peak,
        Season::Peak if months <= 1 => rates.peak_first_month,
        Season::Peak => rates.peak_extended,
    };
    round2(cubic_feet * rate * Decimal::from(months))
}

/// Default product cost when the user has not entered one.
pub fn starting_product_cost(price: Decimal) -> Decimal {
    round2(price / Decimal::from(3))
}

fn cost_rate_fee(cost: &CostRate, weight: Decimal) -> Decimal {
    match cost.mode {
        CostMode::PerPound => round2(cost.rate * weight),
        CostMode::Flat => round2(cost.rate),
    }
}

/// Fee calculator bound to one fee schedule
#[derive(Debug, Clone, Copy)]
pub struct FeeCalculator<'a> {
    schedule: &'a FeeSchedule,
}

impl<'a> FeeCalculator<'a> {
    pub fn new(schedule: &'a FeeSchedule) -> Self {
        FeeCalculator { schedule }
    }

    pub fn referral_fee(&self, price: Decimal, category: &str) -> Decimal {
        round2(price * self.schedule.referral_rate(price, category))
    }

    /// Zero unless the platform fulfills the order.
    pub fn fulfillment_fee(&self, snapshot: &ProductSnapshot, price: Decimal, platform_fulfilled: bool) -> Decimal {
        if !platform_fulfilled {
            return Decimal::ZERO;
        }

        let dims = &snapshot.dimensions;
        if is_big_and_bulky(dims) {
            return round2(big_and_bulky_fee(dims.weight));
        }

        let mut fee = base_fulfillment_fee(shipping_weight_fulfillment(dims));
        if snapshot.is_apparel() {
            fee += cents(50);
        }
        if snapshot.is_hazardous() {
            fee += cents(50);
        }
        if price < Decimal::TEN {
            fee += Decimal::ONE;
        }
        if is_oversize(dims) {
            fee += Decimal::from(3);
        }
        if is_additional_oversize(dims) {
            fee += Decimal::from(20);
        }
        round2(fee)
    }

    pub fn prep_fee(&self, weight: Decimal) -> Decimal {
        cost_rate_fee(&self.schedule.prep, weight)
    }

    pub fn additional_fees(&self, weight: Decimal) -> Decimal {
        cost_rate_fee(&self.schedule.additional, weight)
    }

    pub fn inbound_shipping(&self, weight: Decimal, platform_fulfilled: bool) -> Decimal {
        let rate = if platform_fulfilled {
            self.schedule.inbound_rate_platform
        } else {
            self.schedule.inbound_rate_seller
        };
        round2(weight * rate)
    }

    /// Seller-paid delivery to the customer; zero when the platform ships.
    pub fn outbound_shipping(&self, weight: Decimal, platform_fulfilled: bool) -> Decimal {
        if platform_fulfilled {
            return Decimal::ZERO;
        }
        round2(weight * self.schedule.outbound_rate)
    }

    pub fn storage_fee(&self, cubic_feet: Decimal, months: u32) -> Decimal {
        storage_fee(&self.schedule.storage, self.schedule.storage_season, cubic_feet, months)
    }

    /// All fee components, with explicit overrides taking precedence.
    pub fn compute(&self, snapshot: &ProductSnapshot, overrides: &PricingOverrides) -> ComputedFees {
        let dims = &snapshot.dimensions;
        let price = overrides.sale_price.unwrap_or(snapshot.price);
        let platform_fulfilled = overrides
            .platform_fulfilled
            .unwrap_or_else(|| snapshot.is_platform_fulfilled());
        let months = overrides.storage_months.unwrap_or(self.schedule.storage_months);

        let inbound_weight = shipping_weight_inbound(dims);
        let cubic = cubic_feet(dims);

        let storage = self.storage_fee(cubic, months);

        let pick = |explicit: Option<Decimal>, derived: Decimal| explicit.map(round2).unwrap_or(derived);

        ComputedFees {
            referral_fee: pick(overrides.referral_fee, self.referral_fee(price, &snapshot.category)),
            fulfillment_fee: pick(
                overrides.fulfillment_fee,
                self.fulfillment_fee(snapshot, price, platform_fulfilled),
            ),
            prep_fee: pick(overrides.prep_fee, self.prep_fee(dims.weight)),
            storage_fee: pick(overrides.storage_fee, storage),
            inbound_shipping: pick(
                overrides.inbound_shipping,
                self.inbound_shipping(inbound_weight, platform_fulfilled),
            ),
            outbound_shipping: pick(
                overrides.outbound_shipping,
                self.outbound_shipping(inbound_weight, platform_fulfilled),
            ),
            additional_fees: pick(overrides.additional_fees, self.additional_fees(dims.weight)),
            shipping_weight_fulfillment: shipping_weight_fulfillment(dims),
            shipping_weight_inbound: round2(inbound_weight),
            dimensional_weight: round2(dimensional_weight(dims)),
            cubic_feet: round2(cubic),
            starting_product_cost: pick(overrides.product_cost, starting_product_cost(price)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot(dims: Dimensions, category: &str, price: Decimal) -> ProductSnapshot {
        ProductSnapshot::new("42", price, dims, category)
    }

    #[test]
    fn test_round2_half_up() {
        assert_eq!(round2(dec!(1.005)), dec!(1.01));
        assert_eq!(round2(dec!(1.004)), dec!(1.00));
        assert_eq!(round2(dec!(2.675)), dec!(2.68));
    }

    #[test]
    fn test_referral_fee_tiers() {
        let schedule = FeeSchedule::default();
        let calc = FeeCalculator::new(&schedule);

        assert_eq!(calc.referral_fee(dec!(14.99), "Apparel & Accessories"), dec!(0.75));
        assert_eq!(calc.referral_fee(dec!(19.99), "Apparel & Accessories"), dec!(2.00));
        assert_eq!(calc.referral_fee(dec!(25), "Apparel & Accessories"), dec!(3.75));
        assert_eq!(calc.referral_fee(dec!(100), "Unknown Stuff"), dec!(15.00));
    }

    #[test]
    fn test_dimensional_helpers() {
        let dims = Dimensions::new(dec!(12), dec!(12), dec!(12), dec!(5));
        assert_eq!(cubic_feet(&dims), Decimal::ONE);
        assert_eq!(round2(dimensional_weight(&dims)), dec!(10.41));
        assert_eq!(shipping_weight_inbound(&dims), dimensional_weight(&dims));
    }

    #[test]
    fn test_base_fee_bands() {
        assert_eq!(base_fulfillment_fee(dec!(1)), dec!(3.45));
        assert_eq!(base_fulfillment_fee(dec!(2)), dec!(4.95));
        assert_eq!(base_fulfillment_fee(dec!(3)), dec!(5.45));
        assert_eq!(base_fulfillment_fee(dec!(4)), dec!(5.75));
        assert_eq!(base_fulfillment_fee(dec!(10)), dec!(8.15));
        assert_eq!(base_fulfillment_fee(dec!(25)), dec!(17.15));
        assert_eq!(base_fulfillment_fee(dec!(60)), dec!(21.15));
    }

    #[test]
    fn test_big_and_bulky_fee() {
        let schedule = FeeSchedule::default();
        let calc = FeeCalculator::new(&schedule);
        let dims = Dimensions::new(dec!(20), dec!(20), dec!(20), dec!(151));

        assert!(is_big_and_bulky(&dims));
        let fee = calc.fulfillment_fee(&snapshot(dims, "Furniture", dec!(500)), dec!(500), true);
        assert_eq!(fee, dec!(203.80));
    }

    #[test]
    fn test_big_and_bulky_by_length() {
        let dims = Dimensions::new(dec!(110), dec!(2), dec!(2), dec!(20));
        assert!(is_big_and_bulky(&dims));
        assert_eq!(shipping_weight_fulfillment(&dims), dec!(21));
    }

    #[test]
    fn test_not_platform_fulfilled_has_no_fulfillment_fee() {
        let schedule = FeeSchedule::default();
        let calc = FeeCalculator::new(&schedule);
        let dims = Dimensions::new(dec!(5), dec!(5), dec!(5), dec!(1));
        assert_eq!(calc.fulfillment_fee(&snapshot(dims, "Toys", dec!(20)), dec!(20), false), Decimal::ZERO);
    }

    #[test]
    fn test_fulfillment_surcharges() {
        let schedule = FeeSchedule::default();
        let calc = FeeCalculator::new(&schedule);
        // 0.5 lb, tiny box: shipping weight ceil(0.75) = 1 -> 3.45
        let dims = Dimensions::new(dec!(4), dec!(4), dec!(2), dec!(0.5));
        let mut item = snapshot(dims, "Clothing", dec!(8));
        item.hazardous = true;

        // 3.45 + 0.50 apparel + 0.50 hazmat + 1.00 low price
        assert_eq!(calc.fulfillment_fee(&item, dec!(8), true), dec!(5.45));
    }

    #[test]
    fn test_oversize_surcharges() {
        let schedule = FeeSchedule::default();
        let calc = FeeCalculator::new(&schedule);

        let oversize = Dimensions::new(dec!(50), dec!(5), dec!(5), dec!(30));
        assert!(is_oversize(&oversize));
        assert!(!is_additional_oversize(&oversize));
        // shipping weight ceil(30.25) = 31 -> 14.55 + 3.00
        assert_eq!(calc.fulfillment_fee(&snapshot(oversize, "Toys", dec!(40)), dec!(40), true), dec!(17.55));

        let additional = Dimensions::new(dec!(100), dec!(1), dec!(1), dec!(30));
        assert!(is_additional_oversize(&additional));
        assert!(!is_oversize(&additional));
    }

    #[test]
    fn test_shipping_weight_fulfillment_light_item_ignores_dim_weight() {
        let dims = Dimensions::new(dec!(20), dec!(20), dec!(20), dec!(0.6));
        assert_eq!(shipping_weight_fulfillment(&dims), dec!(1));

        let heavy = Dimensions::new(dec!(20), dec!(20), dec!(20), dec!(2));
        // dim weight 48.19 -> ceil(48.44) = 49
        assert_eq!(shipping_weight_fulfillment(&heavy), dec!(49));
    }

    #[test]
    fn test_storage_fee_season_rates() {
        let rates = StorageRates::default();
        assert_eq!(storage_fee(&rates, Season::OffPeak, dec!(2), 3), dec!(4.50));
        assert_eq!(storage_fee(&rates, Season::Peak, dec!(2), 1), dec!(1.50));
        assert_eq!(storage_fee(&rates, Season::Peak, dec!(2), 2), dec!(6.00));
        assert_eq!(storage_fee(&rates, Season::Peak, dec!(2), 0), Decimal::ZERO);
    }

    #[test]
    fn test_prep_and_additional_modes() {
        let schedule = FeeSchedule {
            prep: CostRate { rate: dec!(0.30), mode: CostMode::PerPound },
            additional: CostRate { rate: dec!(1.10), mode: CostMode::Flat },
            ..FeeSchedule::default()
        };
        let calc = FeeCalculator::new(&schedule);

        assert_eq!(calc.prep_fee(dec!(2.5)), dec!(0.75));
        assert_eq!(calc.additional_fees(dec!(2.5)), dec!(1.10));
    }

    #[test]
    fn test_inbound_and_outbound_shipping() {
        let schedule = FeeSchedule {
            inbound_rate_seller: dec!(0.20),
            outbound_rate: dec!(0.90),
            ..FeeSchedule::default()
        };
        let calc = FeeCalculator::new(&schedule);

        assert_eq!(calc.inbound_shipping(dec!(3), true), dec!(1.50));
        assert_eq!(calc.inbound_shipping(dec!(3), false), dec!(0.60));
        assert_eq!(calc.outbound_shipping(dec!(3), true), Decimal::ZERO);
        assert_eq!(calc.outbound_shipping(dec!(3), false), dec!(2.70));
    }

    #[test]
    fn test_starting_product_cost() {
        assert_eq!(starting_product_cost(dec!(30)), dec!(10.00));
        assert_eq!(starting_product_cost(dec!(10)), dec!(3.33));
    }

    #[test]
    fn test_compute_is_deterministic_and_respects_overrides() {
        let schedule = FeeSchedule::default();
        let calc = FeeCalculator::new(&schedule);
        let mut item = snapshot(Dimensions::new(dec!(10), dec!(8), dec!(4), dec!(2)), "Toys", dec!(30));
        item.fulfillment_types.push("WFS".to_string());

        let overrides = PricingOverrides {
            referral_fee: Some(dec!(1.234)),
            product_cost: Some(dec!(7)),
            ..PricingOverrides::default()
        };

        let first = calc.compute(&item, &overrides);
        let second = calc.compute(&item, &overrides);
        assert_eq!(first, second);

        assert_eq!(first.referral_fee, dec!(1.23));
        assert_eq!(first.starting_product_cost, dec!(7));
        // 2 lb, dim weight 1.93 -> ceil(2.25) = 3 -> 5.45
        assert_eq!(first.fulfillment_fee, dec!(5.45));
        assert_eq!(first.inbound_shipping, dec!(1.00));
    }

    #[test]
    fn test_compute_seller_fulfilled_skips_fulfillment_fee() {
        let schedule = FeeSchedule::default();
        let calc = FeeCalculator::new(&schedule);
        let item = snapshot(Dimensions::new(dec!(10), dec!(8), dec!(4), dec!(2)), "Toys", dec!(30));

        let fees = calc.compute(&item, &PricingOverrides::default());
        assert_eq!(fees.fulfillment_fee, Decimal::ZERO);
        // 320 cu in -> 0.185 cu ft * 0.75 off-peak; storage does not depend on who ships
        assert_eq!(fees.storage_fee, dec!(0.14));
        assert_eq!(fees.referral_fee, dec!(4.50));
        assert_eq!(fees.starting_product_cost, dec!(10.00));
    }
}
