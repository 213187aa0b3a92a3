use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use rust_decimal::Decimal;

use crate::book::PriceLevel;
use crate::domain::{BookSnapshot, DepthLevel, Order, OrderType, Side, Trade};

/// Outcome of feeding one order through the matching pass.
#[derive(Debug)]
pub struct MatchResult {
    pub trades: Vec<Trade>,
    /// Set when a limit residual was left resting on the book.
    pub resting_order_id: Option<u64>,
}

#[derive(Debug)]
pub enum CancelOutcome {
    Cancelled(Order),
    /// The id is not resting (already filled or already cancelled).
    /// A no-op by design, to absorb the cancel/fill race.
    Unknown,
}

/// Pure price-time-priority book. Owns no concurrency concerns; the
/// exchange serializes every call to `apply` and `cancel`.
pub struct OrderBook {
    bids: BTreeMap<Reverse<Decimal>, PriceLevel>,
    asks: BTreeMap<Decimal, PriceLevel>,
    /// Location of every resting order, for cancels.
    resting: HashMap<u64, (Side, Decimal)>,
    next_trade_seq: u64,
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            resting: HashMap::new(),
            next_trade_seq: 1,
        }
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next().map(|r| r.0)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    pub fn contains(&self, order_id: u64) -> bool {
        self.resting.contains_key(&order_id)
    }

    /// Matches an incoming order against the opposing side, then handles
    /// the residual by order type: limit residuals rest at the back of
    /// their level's queue, market and IOC residuals are discarded.
    pub fn apply(&mut self, mut order: Order) -> MatchResult {
        let mut trades = Vec::new();

        while order.remaining_qty > Decimal::ZERO {
            let maker_price = match order.side {
                Side::Buy => self.best_ask(),
                Side::Sell => self.best_bid(),
            };
            let Some(maker_price) = maker_price else { break };

            let crosses = match order.price {
                None => true, // market order takes any price
                Some(limit) => match order.side {
                    Side::Buy => maker_price <= limit,
                    Side::Sell => maker_price >= limit,
                },
            };
            if !crosses {
                break;
            }

            let level = match order.side {
                Side::Buy => self.asks.get_mut(&maker_price),
                Side::Sell => self.bids.get_mut(&Reverse(maker_price)),
            }
            .expect("best price always has a level");

            let maker = level.front().expect("levels are never empty");
            let maker_id = maker.id;
            let qty = order.remaining_qty.min(maker.remaining_qty);

            if let Some(done) = level.fill_front(qty) {
                self.resting.remove(&done.id);
            }
            order.remaining_qty -= qty;

            let seq = self.next_trade_seq;
            self.next_trade_seq += 1;
            trades.push(Trade {
                seq,
                maker_order_id: maker_id,
                taker_order_id: order.id,
                price: maker_price,
                quantity: qty,
                timestamp: Utc::now(),
            });

            if level.is_empty() {
                match order.side {
                    Side::Buy => self.asks.remove(&maker_price),
                    Side::Sell => self.bids.remove(&Reverse(maker_price)),
                };
            }
        }

        let resting_order_id = if order.remaining_qty > Decimal::ZERO
            && order.order_type == OrderType::Limit
        {
            let price = order.price.expect("limit order carries a price");
            let id = order.id;
            self.resting.insert(id, (order.side, price));
            match order.side {
                Side::Buy => self
                    .bids
                    .entry(Reverse(price))
                    .or_insert_with(|| PriceLevel::new(price))
                    .push_back(order),
                Side::Sell => self
                    .asks
                    .entry(price)
                    .or_insert_with(|| PriceLevel::new(price))
                    .push_back(order),
            }
            Some(id)
        } else {
            None
        };

        // A crossed book here is a matching bug; halt rather than let the
        // trade history diverge.
        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            assert!(bid < ask, "book crossed after apply: bid {bid} >= ask {ask}");
        }

        MatchResult { trades, resting_order_id }
    }

    /// Removes a resting order. Unknown ids are reported as such, not as
    /// errors: a fill may legitimately have consumed the order first.
    pub fn cancel(&mut self, order_id: u64) -> CancelOutcome {
        let Some((side, price)) = self.resting.remove(&order_id) else {
            return CancelOutcome::Unknown;
        };
        let order = match side {
            Side::Buy => {
                let level = self
                    .bids
                    .get_mut(&Reverse(price))
                    .expect("resting index points at a live level");
                let order = level.remove(order_id).expect("resting index points at a live order");
                if level.is_empty() {
                    self.bids.remove(&Reverse(price));
                }
                order
            }
            Side::Sell => {
                let level = self
                    .asks
                    .get_mut(&price)
                    .expect("resting index points at a live level");
                let order = level.remove(order_id).expect("resting index points at a live order");
                if level.is_empty() {
                    self.asks.remove(&price);
                }
                order
            }
        };
        CancelOutcome::Cancelled(order)
    }

    /// Full-depth view, bids descending and asks ascending.
    pub fn snapshot(&self, seq: u64, last_trade_price: Option<Decimal>) -> BookSnapshot {
        BookSnapshot {
            seq,
            best_bid: self.best_bid(),
            best_ask: self.best_ask(),
            last_trade_price,
            bids: self
                .bids
                .values()
                .map(|l| DepthLevel { price: l.price(), quantity: l.total_qty() })
                .collect(),
            asks: self
                .asks
                .values()
                .map(|l| DepthLevel { price: l.price(), quantity: l.total_qty() })
                .collect(),
        }
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderRequest, Owner};
    use rust_decimal_macros::dec;

    fn order(
        id: u64,
        side: Side,
        order_type: OrderType,
        price: Option<Decimal>,
        quantity: Decimal,
    ) -> Order {
        OrderRequest { side, order_type, price, quantity, owner: Owner::Generator }
            .into_order(id, id)
    }

    fn limit(id: u64, side: Side, price: Decimal, quantity: Decimal) -> Order {
        order(id, side, OrderType::Limit, Some(price), quantity)
    }

    #[test]
    fn limit_on_empty_book_rests_without_trading() {
        let mut book = OrderBook::new();
        let result = book.apply(limit(1, Side::Buy, dec!(10), dec!(100)));

        assert!(result.trades.is_empty());
        assert_eq!(result.resting_order_id, Some(1));
        let snapshot = book.snapshot(1, None);
        assert_eq!(snapshot.bids, vec![DepthLevel { price: dec!(10), quantity: dec!(100) }]);
        assert!(snapshot.asks.is_empty());
    }

    #[test]
    fn market_order_fills_fifo_within_a_level() {
        let mut book = OrderBook::new();
        book.apply(limit(1, Side::Sell, dec!(10), dec!(50)));
        book.apply(limit(2, Side::Sell, dec!(10), dec!(30)));

        let result = book.apply(order(3, Side::Buy, OrderType::Market, None, dec!(60)));

        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[0].maker_order_id, 1);
        assert_eq!(result.trades[0].quantity, dec!(50));
        assert_eq!(result.trades[0].price, dec!(10));
        assert_eq!(result.trades[1].maker_order_id, 2);
        assert_eq!(result.trades[1].quantity, dec!(10));
        assert!(result.resting_order_id.is_none());

        let snapshot = book.snapshot(3, None);
        assert_eq!(snapshot.asks, vec![DepthLevel { price: dec!(10), quantity: dec!(20) }]);
        assert!(book.contains(2));
        assert!(!book.contains(1));
    }

    #[test]
    fn ioc_into_empty_side_cancels_fully() {
        let mut book = OrderBook::new();
        let result = book.apply(order(1, Side::Sell, OrderType::Ioc, Some(dec!(9)), dec!(40)));

        assert!(result.trades.is_empty());
        assert!(result.resting_order_id.is_none());
        assert!(book.snapshot(1, None).asks.is_empty());
        assert!(book.snapshot(1, None).bids.is_empty());
    }

    #[test]
    fn ioc_respects_its_limit_price() {
        let mut book = OrderBook::new();
        book.apply(limit(1, Side::Sell, dec!(10), dec!(5)));
        book.apply(limit(2, Side::Sell, dec!(11), dec!(5)));

        // Crosses the 10 level only; residual is discarded, never rests.
        let result = book.apply(order(3, Side::Buy, OrderType::Ioc, Some(dec!(10)), dec!(8)));

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].price, dec!(10));
        assert_eq!(result.trades[0].quantity, dec!(5));
        assert!(result.resting_order_id.is_none());
        assert_eq!(book.best_ask(), Some(dec!(11)));
        assert_eq!(book.best_bid(), None);
    }

    #[test]
    fn crossing_limit_sweeps_levels_then_rests() {
        let mut book = OrderBook::new();
        book.apply(limit(1, Side::Sell, dec!(10), dec!(5)));
        book.apply(limit(2, Side::Sell, dec!(11), dec!(5)));

        let result = book.apply(limit(3, Side::Buy, dec!(12), dec!(15)));

        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[0].price, dec!(10));
        assert_eq!(result.trades[1].price, dec!(11));
        assert!(result.trades[0].seq < result.trades[1].seq);
        assert_eq!(result.resting_order_id, Some(3));
        assert_eq!(book.best_bid(), Some(dec!(12)));
        assert_eq!(book.best_ask(), None);
    }

    #[test]
    fn book_never_crosses_when_both_sides_populated() {
        let mut book = OrderBook::new();
        book.apply(limit(1, Side::Sell, dec!(10), dec!(5)));
        book.apply(limit(2, Side::Buy, dec!(9), dec!(5)));
        // Takes part of the ask, rests nothing on the bid side.
        book.apply(order(3, Side::Buy, OrderType::Ioc, Some(dec!(10)), dec!(3)));

        let (bid, ask) = (book.best_bid().unwrap(), book.best_ask().unwrap());
        assert!(bid < ask);
    }

    #[test]
    fn fills_conserve_quantity() {
        let mut book = OrderBook::new();
        book.apply(limit(1, Side::Sell, dec!(10), dec!(7)));
        let result = book.apply(order(2, Side::Buy, OrderType::Market, None, dec!(4)));

        let filled: Decimal = result.trades.iter().map(|t| t.quantity).sum();
        assert_eq!(filled, dec!(4));
        let snapshot = book.snapshot(2, None);
        assert_eq!(snapshot.asks[0].quantity, dec!(3));
    }

    #[test]
    fn market_residual_is_discarded() {
        let mut book = OrderBook::new();
        book.apply(limit(1, Side::Sell, dec!(10), dec!(5)));
        let result = book.apply(order(2, Side::Buy, OrderType::Market, None, dec!(50)));

        assert_eq!(result.trades.len(), 1);
        assert!(result.resting_order_id.is_none());
        let snapshot = book.snapshot(2, None);
        assert!(snapshot.bids.is_empty());
        assert!(snapshot.asks.is_empty());
    }

    #[test]
    fn same_price_fills_in_arrival_order_across_sizes() {
        let mut book = OrderBook::new();
        book.apply(limit(1, Side::Buy, dec!(10), dec!(2)));
        book.apply(limit(2, Side::Buy, dec!(10), dec!(9)));
        book.apply(limit(3, Side::Buy, dec!(10), dec!(1)));

        let result = book.apply(order(4, Side::Sell, OrderType::Market, None, dec!(11)));

        let makers: Vec<u64> = result.trades.iter().map(|t| t.maker_order_id).collect();
        assert_eq!(makers, vec![1, 2]);
        assert_eq!(book.snapshot(4, None).bids[0].quantity, dec!(1));
        assert_eq!(book.best_bid(), Some(dec!(10)));
    }

    #[test]
    fn cancel_removes_resting_order_and_empty_level() {
        let mut book = OrderBook::new();
        book.apply(limit(1, Side::Buy, dec!(10), dec!(5)));

        match book.cancel(1) {
            CancelOutcome::Cancelled(order) => assert_eq!(order.id, 1),
            CancelOutcome::Unknown => panic!("order was resting"),
        }
        assert!(book.snapshot(1, None).bids.is_empty());
        assert!(matches!(book.cancel(1), CancelOutcome::Unknown));
    }

    #[test]
    fn cancel_of_filled_order_is_a_noop() {
        let mut book = OrderBook::new();
        book.apply(limit(1, Side::Sell, dec!(10), dec!(5)));
        book.apply(order(2, Side::Buy, OrderType::Market, None, dec!(5)));

        assert!(matches!(book.cancel(1), CancelOutcome::Unknown));
    }

    #[test]
    fn trade_sequences_increase_across_applies() {
        let mut book = OrderBook::new();
        book.apply(limit(1, Side::Sell, dec!(10), dec!(5)));
        let a = book.apply(order(2, Side::Buy, OrderType::Market, None, dec!(2)));
        let b = book.apply(order(3, Side::Buy, OrderType::Market, None, dec!(2)));

        assert!(a.trades.last().unwrap().seq < b.trades[0].seq);
    }
}
