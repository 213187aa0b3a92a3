use std::collections::VecDeque;

use rust_decimal::Decimal;

use crate::domain::Order;

/// All resting orders at one price, in strict arrival order. Every
/// order in the queue has `remaining_qty > 0` and this level's price;
/// `total_qty` is kept equal to the sum of remaining quantities.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    price: Decimal,
    orders: VecDeque<Order>,
    total_qty: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
            total_qty: Decimal::ZERO,
        }
    }

    /// Appends at the back of the queue, behind every earlier arrival.
    pub fn push_back(&mut self, order: Order) {
        debug_assert_eq!(order.price, Some(self.price));
        debug_assert!(order.remaining_qty > Decimal::ZERO);
        self.total_qty += order.remaining_qty;
        self.orders.push_back(order);
    }

    pub fn front(&self) -> Option<&Order> {
        self.orders.front()
    }

    /// Fills `qty` against the earliest-arrived order. The order is
    /// removed once fully consumed; returns it when that happens.
    pub fn fill_front(&mut self, qty: Decimal) -> Option<Order> {
        let front = self.orders.front_mut()?;
        debug_assert!(qty <= front.remaining_qty);
        front.remaining_qty -= qty;
        self.total_qty -= qty;
        if front.remaining_qty == Decimal::ZERO {
            self.orders.pop_front()
        } else {
            None
        }
    }

    /// Removes an order by id regardless of queue position (cancel path).
    pub fn remove(&mut self, order_id: u64) -> Option<Order> {
        let pos = self.orders.iter().position(|o| o.id == order_id)?;
        let order = self.orders.remove(pos)?;
        self.total_qty -= order.remaining_qty;
        Some(order)
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn total_qty(&self) -> Decimal {
        self.total_qty
    }
}
