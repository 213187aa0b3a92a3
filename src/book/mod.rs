pub mod order_book;
pub mod price_level;

pub use order_book::{CancelOutcome, OrderBook};
pub use price_level::PriceLevel;
