pub mod order;
pub mod snapshot;
pub mod trade;

pub use order::{Order, OrderRequest, OrderType, Owner, Side, ValidationError};
pub use snapshot::{BookSnapshot, DepthLevel, TimedPoint};
pub use trade::Trade;
