//! profitability.rs - Profit, ROI and margin from computed fees

use rust_decimal::Decimal;

use crate::fees::round2;
use crate::models::{ComputedFees, ProfitabilityResult};

/// Profit after product cost and every deducted fee.
pub fn total_profit(price: Decimal, cost: Decimal, fees: &ComputedFees) -> Decimal {
    round2(price - (cost + fees.deducted_total()))
}

/// Percent return on product cost; zero when cost is not positive.
pub fn roi(profit: Decimal, cost: Decimal) -> Decimal {
    if cost > Decimal::ZERO {
        round2(Decimal::ONE_HUNDRED * profit / cost)
    } else {
        Decimal::ZERO
    }
}

/// Percent of the sale price kept as profit; zero when price is not positive.
pub fn margin(profit: Decimal, price: Decimal) -> Decimal {
    if price > Decimal::ZERO {
        round2(Decimal::ONE_HUNDRED * profit / price)
    } else {
        Decimal::ZERO
    }
}

pub fn evaluate(price: Decimal, cost: Decimal, fees: &ComputedFees) -> ProfitabilityResult {
    let profit = total_profit(price, cost, fees);
    ProfitabilityResult {
        total_profit: profit,
        roi: roi(profit, cost),
        margin: margin(profit, price),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fees_summing_to_twenty() -> ComputedFees {
        ComputedFees {
            referral_fee: dec!(15),
            fulfillment_fee: dec!(3),
            inbound_shipping: dec!(1),
            storage_fee: dec!(0.50),
            prep_fee: dec!(0.25),
            additional_fees: dec!(0.25),
            outbound_shipping: dec!(9.99),
            ..ComputedFees::default()
        }
    }

    #[test]
    fn test_profitability_identity() {
        let result = evaluate(dec!(100), dec!(30), &fees_summing_to_twenty());

        assert_eq!(result.total_profit, dec!(50));
        assert_eq!(result.roi, dec!(166.67));
        assert_eq!(result.margin, dec!(50.00));
    }

    #[test]
    fn test_zero_cost_and_price_guard() {
        let fees = ComputedFees::default();
        let result = evaluate(Decimal::ZERO, Decimal::ZERO, &fees);

        assert_eq!(result.total_profit, Decimal::ZERO);
        assert_eq!(result.roi, Decimal::ZERO);
        assert_eq!(result.margin, Decimal::ZERO);
    }

    #[test]
    fn test_negative_profit() {
        let result = evaluate(dec!(10), dec!(8), &fees_summing_to_twenty());

        assert_eq!(result.total_profit, dec!(-18));
        assert_eq!(result.roi, dec!(-225));
        assert_eq!(result.margin, dec!(-180));
    }
}
