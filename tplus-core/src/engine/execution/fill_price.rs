//! Fill price resolution and the price-limit check.

use crate::domain::bar::Bar;
use crate::domain::order::{OrderSide, RejectReason};
use crate::engine::settings::PriceLimits;
use rust_decimal::Decimal;

/// Which bar price an order executes against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillTiming {
    /// T+1 settlement at the settlement session's open.
    NextOpen,
    /// T+0 fill at the current session's close.
    SameClose,
}

impl FillTiming {
    pub fn base_price(self, bar: &Bar) -> Decimal {
        match self {
            FillTiming::NextOpen => bar.open,
            FillTiming::SameClose => bar.close,
        }
    }
}

/// Candidate fill price: never pay above a buy limit, never sell below a sell
/// limit, and take the better of limit and base when the market allows it.
pub fn candidate_price(side: OrderSide, limit: Option<Decimal>, base: Decimal) -> Decimal {
    match (limit, side) {
        (Some(limit), OrderSide::Buy) => limit.min(base),
        (Some(limit), OrderSide::Sell) => limit.max(base),
        (None, _) => base,
    }
}

/// Limit-up / limit-down heuristic against the session's range.
pub fn limit_rejection(
    side: OrderSide,
    fill_price: Decimal,
    bar: &Bar,
    limits: &PriceLimits,
) -> Option<RejectReason> {
    match side {
        OrderSide::Buy if fill_price >= bar.high * limits.up_ratio => Some(RejectReason::LimitUp),
        OrderSide::Sell if fill_price <= bar.low * limits.down_ratio => {
            Some(RejectReason::LimitDown)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn bar(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Bar {
        Bar {
            symbol: "600000.SH".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            open,
            high,
            low,
            close,
            volume: 1_000_000,
        }
    }

    #[test]
    fn market_orders_take_base_price() {
        assert_eq!(candidate_price(OrderSide::Buy, None, dec!(10)), dec!(10));
        assert_eq!(candidate_price(OrderSide::Sell, None, dec!(10)), dec!(10));
    }

    #[test]
    fn buy_limit_caps_price() {
        assert_eq!(candidate_price(OrderSide::Buy, Some(dec!(9.5)), dec!(10)), dec!(9.5));
        assert_eq!(candidate_price(OrderSide::Buy, Some(dec!(11)), dec!(10)), dec!(10));
    }

    #[test]
    fn sell_limit_floors_price() {
        assert_eq!(candidate_price(OrderSide::Sell, Some(dec!(10.5)), dec!(10)), dec!(10.5));
        assert_eq!(candidate_price(OrderSide::Sell, Some(dec!(9)), dec!(10)), dec!(10));
    }

    #[test]
    fn buy_at_high_is_limit_up() {
        let b = bar(dec!(11), dec!(11), dec!(10.5), dec!(11));
        let limits = PriceLimits::default();
        assert_eq!(
            limit_rejection(OrderSide::Buy, dec!(11), &b, &limits),
            Some(RejectReason::LimitUp)
        );
        assert_eq!(limit_rejection(OrderSide::Sell, dec!(11), &b, &limits), None);
    }

    #[test]
    fn sell_at_low_is_limit_down() {
        let b = bar(dec!(9), dec!(9.5), dec!(9), dec!(9));
        let limits = PriceLimits::default();
        assert_eq!(
            limit_rejection(OrderSide::Sell, dec!(9), &b, &limits),
            Some(RejectReason::LimitDown)
        );
        assert_eq!(limit_rejection(OrderSide::Buy, dec!(9), &b, &limits), None);
    }

    #[test]
    fn open_inside_range_passes() {
        let b = bar(dec!(10), dec!(10.5), dec!(9.5), dec!(10.2));
        let limits = PriceLimits::default();
        assert_eq!(limit_rejection(OrderSide::Buy, dec!(10), &b, &limits), None);
        assert_eq!(limit_rejection(OrderSide::Sell, dec!(10), &b, &limits), None);
    }

    #[test]
    fn timing_picks_open_or_close() {
        let b = bar(dec!(10), dec!(10.5), dec!(9.5), dec!(10.2));
        assert_eq!(FillTiming::NextOpen.base_price(&b), dec!(10));
        assert_eq!(FillTiming::SameClose.base_price(&b), dec!(10.2));
    }
}
