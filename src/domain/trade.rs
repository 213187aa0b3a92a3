use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// An executed match. Append-only: trades are never mutated after the
/// engine emits them, and `seq` defines the canonical trade timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub seq: u64,
    pub maker_order_id: u64,
    pub taker_order_id: u64,
    /// Always the resting (maker) order's price.
    pub price: Decimal,
    pub quantity: Decimal,
    pub timestamp: DateTime<Utc>,
}
