use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Aggregate quantity resting at one price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepthLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Consistent view of the book as of one matching-sequence point.
/// Published wholesale by the exchange after each apply, so readers see
/// either the pre- or post-match state, never partial mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BookSnapshot {
    /// Arrival sequence of the last submission folded into this view.
    pub seq: u64,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub last_trade_price: Option<Decimal>,
    /// Depth by price, best first: bids descending, asks ascending.
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

impl BookSnapshot {
    /// Midpoint of best bid and ask; undefined when either side is empty.
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

}

/// One row of a reporting time series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimedPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Decimal,
}

impl TimedPoint {
    pub fn now(value: Decimal) -> Self {
        Self { timestamp: Utc::now(), value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn mid_price_is_midpoint_of_best_quotes() {
        let snapshot = BookSnapshot {
            best_bid: Some(dec!(99)),
            best_ask: Some(dec!(101)),
            ..Default::default()
        };
        assert_eq!(snapshot.mid_price(), Some(dec!(100)));
    }

    #[test]
    fn mid_price_is_undefined_with_one_empty_side() {
        let snapshot = BookSnapshot {
            best_bid: Some(dec!(99)),
            best_ask: None,
            ..Default::default()
        };
        assert_eq!(snapshot.mid_price(), None);
    }

    #[test]
    fn depth_serializes_with_plain_decimal_fields() {
        let snapshot = BookSnapshot {
            seq: 3,
            best_bid: Some(dec!(99.5)),
            bids: vec![DepthLevel { price: dec!(99.5), quantity: dec!(12.5) }],
            ..Default::default()
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["seq"], 3);
        assert_eq!(json["bids"][0]["price"], "99.5");
    }
}
