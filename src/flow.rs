use std::collections::VecDeque;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tokio::time::interval;
use tracing::{debug, warn};

use crate::domain::{OrderRequest, OrderType, Owner, Side};
use crate::exchange::{ExchangeHandle, SubmitError};

#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub tick: Duration,
    pub initial_price: f64,
    /// Std dev of the per-tick reference price step (the random walk).
    pub step_sigma: f64,
    /// Std dev of a limit order's signed distance from the reference.
    pub offset_sigma: f64,
    pub base_qty: f64,
    pub qty_noise: f64,
    /// Limit orders emitted per tick.
    pub orders_per_tick: usize,
    /// Chance of adding one taker (market or IOC) order per tick.
    pub taker_prob: f64,
    /// Of those takers, chance of an IOC instead of a market order.
    pub ioc_prob: f64,
    pub taker_qty: f64,
    /// Oldest resting orders are cancelled beyond this count per side,
    /// so the book does not grow without bound.
    pub max_resting_per_side: usize,
    pub price_floor: f64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(50),
            initial_price: 100.0,
            step_sigma: 0.05,
            offset_sigma: 0.2,
            base_qty: 8.0,
            qty_noise: 3.0,
            orders_per_tick: 3,
            taker_prob: 0.6,
            ioc_prob: 0.2,
            taker_qty: 10.0,
            max_resting_per_side: 64,
            price_floor: 1.0,
        }
    }
}

/// Synthetic order flow. Walks an internal reference price and quotes
/// around it with randomized side, size, and offset; the taker orders it
/// mixes in drag the realized mid toward the reference.
pub struct OrderFlowGenerator {
    config: FlowConfig,
    rng: StdRng,
    reference_mid: f64,
    step: Normal<f64>,
    offset: Normal<f64>,
    noise: Normal<f64>,
    bid_ids: VecDeque<u64>,
    ask_ids: VecDeque<u64>,
    skipped: u64,
}

impl OrderFlowGenerator {
    pub fn new(config: FlowConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let step = Normal::new(0.0, config.step_sigma).expect("step sigma must be positive");
        let offset = Normal::new(0.0, config.offset_sigma).expect("offset sigma must be positive");
        let noise = Normal::new(0.0, config.qty_noise).expect("qty noise must be positive");
        Self {
            reference_mid: config.initial_price,
            config,
            rng,
            step,
            offset,
            noise,
            bid_ids: VecDeque::new(),
            ask_ids: VecDeque::new(),
            skipped: 0,
        }
    }

    /// Advances the reference by one random-walk step and builds this
    /// tick's submissions. Malformed draws are counted and skipped,
    /// never submitted.
    pub fn build_orders(&mut self) -> Vec<OrderRequest> {
        self.reference_mid = (self.reference_mid + self.step.sample(&mut self.rng))
            .max(self.config.price_floor);

        let mut requests = Vec::new();
        for _ in 0..self.config.orders_per_tick {
            let side = if self.rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
            let price = self.reference_mid + self.offset.sample(&mut self.rng);
            let quantity = self.config.base_qty + self.noise.sample(&mut self.rng);
            let Some(request) = self.limit_request(side, price, quantity) else {
                self.skipped += 1;
                continue;
            };
            requests.push(request);
        }

        if self.rng.gen_bool(self.config.taker_prob) {
            let side = if self.rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
            let quantity = self.config.taker_qty + self.noise.sample(&mut self.rng);
            let request = if self.rng.gen_bool(self.config.ioc_prob) {
                self.limit_request(side, self.reference_mid, quantity)
                    .map(|mut r| {
                        r.order_type = OrderType::Ioc;
                        r
                    })
            } else {
                quantize(quantity).map(|quantity| OrderRequest {
                    side,
                    order_type: OrderType::Market,
                    price: None,
                    quantity,
                    owner: Owner::Generator,
                })
            };
            match request {
                Some(request) => requests.push(request),
                None => self.skipped += 1,
            }
        }

        requests
    }

    fn limit_request(&self, side: Side, price: f64, quantity: f64) -> Option<OrderRequest> {
        let price = quantize(price)?;
        let quantity = quantize(quantity)?;
        Some(OrderRequest {
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            quantity,
            owner: Owner::Generator,
        })
    }

    pub async fn tick(&mut self, exchange: &ExchangeHandle) {
        for request in self.build_orders() {
            let side = request.side;
            let is_limit = request.order_type == OrderType::Limit;
            match exchange.submit(request).await {
                Ok(outcome) if outcome.resting && is_limit => match side {
                    Side::Buy => self.bid_ids.push_back(outcome.order_id),
                    Side::Sell => self.ask_ids.push_back(outcome.order_id),
                },
                Ok(_) => {}
                Err(SubmitError::Rejected(err)) => {
                    self.skipped += 1;
                    warn!(%err, skipped = self.skipped, "generated order rejected");
                }
                Err(SubmitError::Closed) => return,
            }
        }
        self.trim(exchange).await;
    }

    /// Cancels the oldest resting orders beyond the per-side cap.
    /// Already-consumed ids resolve to no-ops.
    async fn trim(&mut self, exchange: &ExchangeHandle) {
        while self.bid_ids.len() > self.config.max_resting_per_side {
            let id = self.bid_ids.pop_front().expect("len checked above");
            if exchange.cancel(id).await.is_err() {
                return;
            }
        }
        while self.ask_ids.len() > self.config.max_resting_per_side {
            let id = self.ask_ids.pop_front().expect("len checked above");
            if exchange.cancel(id).await.is_err() {
                return;
            }
        }
    }
}

fn quantize(value: f64) -> Option<Decimal> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    let value = Decimal::from_f64(value)?.round_dp(1);
    (value > Decimal::ZERO).then_some(value)
}

pub async fn run_flow(mut generator: OrderFlowGenerator, exchange: ExchangeHandle) {
    let mut ticker = interval(generator.config.tick);
    debug!(config = ?generator.config, "order flow starting");
    loop {
        ticker.tick().await;
        generator.tick(&exchange).await;
    }
}
