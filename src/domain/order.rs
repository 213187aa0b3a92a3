use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
    /// Immediate-or-cancel: priced like a limit, but any residual is
    /// discarded instead of resting.
    Ioc,
}

/// Who submitted an order. Fills are routed back by owner; the
/// generator registers no fill channel and its notifications are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Owner {
    Generator,
    Agent(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("order quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),
    #[error("{0:?} order must carry a price")]
    PriceMissing(OrderType),
    #[error("order price must be positive, got {0}")]
    NonPositivePrice(Decimal),
}

/// A submission as produced by the generator, the agent, or the HTTP
/// boundary. The exchange assigns the order id and arrival sequence.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRequest {
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    pub owner: Owner,
}

impl OrderRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.quantity <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveQuantity(self.quantity));
        }
        match self.order_type {
            OrderType::Limit | OrderType::Ioc => match self.price {
                None => Err(ValidationError::PriceMissing(self.order_type)),
                Some(p) if p <= Decimal::ZERO => Err(ValidationError::NonPositivePrice(p)),
                Some(_) => Ok(()),
            },
            // Market orders take whatever price the book offers.
            OrderType::Market => Ok(()),
        }
    }

    pub fn into_order(self, id: u64, submitted_seq: u64) -> Order {
        Order {
            id,
            side: self.side,
            order_type: self.order_type,
            price: match self.order_type {
                OrderType::Market => None,
                OrderType::Limit | OrderType::Ioc => self.price,
            },
            original_qty: self.quantity,
            remaining_qty: self.quantity,
            submitted_seq,
            owner: self.owner,
            timestamp: Utc::now(),
        }
    }
}

/// A live order. Immutable once created except for `remaining_qty`,
/// which only matching decrements.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: u64,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub original_qty: Decimal,
    pub remaining_qty: Decimal,
    /// Arrival sequence assigned by the exchange; the time component of
    /// price-time priority.
    pub submitted_seq: u64,
    pub owner: Owner,
    pub timestamp: DateTime<Utc>,
}
