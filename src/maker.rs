use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, warn};

use crate::domain::{OrderRequest, OrderType, Owner, Side};
use crate::exchange::{ExchangeHandle, Fill, SubmitError};

#[derive(Debug, Clone)]
pub struct MakerConfig {
    pub name: String,
    pub tick: Duration,
    pub half_spread: Decimal,
    /// Price shift per unit of inventory; quotes move against the
    /// position to encourage inventory-reducing trades.
    pub skew_coeff: Decimal,
    pub quote_qty: Decimal,
    /// Quote size on the risk-increasing side shrinks to zero as
    /// |position| approaches this bound.
    pub max_position: Decimal,
    pub initial_cash: Decimal,
    /// Quotes within this distance of the new target are left resting.
    pub requote_tolerance: Decimal,
}

impl Default for MakerConfig {
    fn default() -> Self {
        Self {
            name: "basic-market-maker".to_owned(),
            tick: Duration::from_millis(250),
            half_spread: dec!(0.2),
            skew_coeff: dec!(0.01),
            quote_qty: dec!(5),
            max_position: dec!(100),
            initial_cash: dec!(10000),
            requote_tolerance: dec!(0.1),
        }
    }
}

/// Bid and ask targets around the mid, shifted by the inventory skew.
/// A long position pushes both quotes down (sell more, buy less), a
/// short position pushes both up.
pub fn quote_targets(mid: Decimal, position: Decimal, config: &MakerConfig) -> (Decimal, Decimal) {
    let skew = -config.skew_coeff * position;
    (mid - config.half_spread + skew, mid + config.half_spread + skew)
}

/// Quote sizes shrink on the side that would grow |position|.
pub fn quote_sizes(position: Decimal, config: &MakerConfig) -> (Decimal, Decimal) {
    let full = config.quote_qty;
    if position >= Decimal::ZERO {
        let bid = (full * (Decimal::ONE - position / config.max_position)).max(Decimal::ZERO);
        (bid.round_dp(1), full)
    } else {
        let ask = (full * (Decimal::ONE + position / config.max_position)).max(Decimal::ZERO);
        (full, ask.round_dp(1))
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenQuote {
    id: u64,
    price: Decimal,
}

/// Quotes continuously around the mid, skewed by inventory, and tracks
/// its own economics. Position and cash move only on fill notifications
/// from the exchange, so a fill racing a cancel is still counted.
pub struct MarketMakerAgent {
    config: MakerConfig,
    position: Decimal,
    cash: Decimal,
    open_bid: Option<OpenQuote>,
    open_ask: Option<OpenQuote>,
    last_mid: Option<Decimal>,
    fills: mpsc::UnboundedReceiver<Fill>,
}

impl MarketMakerAgent {
    pub fn new(config: MakerConfig, exchange: &ExchangeHandle) -> Self {
        let fills = exchange.subscribe_fills(Owner::Agent(config.name.clone()));
        Self {
            position: Decimal::ZERO,
            cash: config.initial_cash,
            open_bid: None,
            open_ask: None,
            last_mid: None,
            config,
            fills,
        }
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.cash - self.config.initial_cash
    }

    pub fn mark_to_market_pnl(&self, mid: Decimal) -> Decimal {
        self.position * mid
    }

    fn apply_fill(&mut self, fill: &Fill) {
        debug!(
            agent = %self.config.name,
            order_id = fill.order_id,
            seq = fill.trade_seq,
            at = %fill.timestamp,
            price = %fill.price,
            quantity = %fill.quantity,
            "fill received"
        );
        match fill.side {
            Side::Buy => {
                self.position += fill.quantity;
                self.cash -= fill.price * fill.quantity;
            }
            Side::Sell => {
                self.position -= fill.quantity;
                self.cash += fill.price * fill.quantity;
            }
        }
        if fill.done {
            if self.open_bid.map(|q| q.id) == Some(fill.order_id) {
                self.open_bid = None;
            }
            if self.open_ask.map(|q| q.id) == Some(fill.order_id) {
                self.open_ask = None;
            }
        }
    }

    /// One decision tick: drain fills, then requote both sides around
    /// the current mid. Skips quoting entirely while the mid is
    /// undefined (one side of the book empty).
    pub async fn tick(&mut self, exchange: &ExchangeHandle) {
        while let Ok(fill) = self.fills.try_recv() {
            self.apply_fill(&fill);
        }

        let snapshot = exchange.snapshot();
        let Some(mid) = snapshot.mid_price() else {
            debug!(agent = %self.config.name, "mid undefined, skipping quote tick");
            self.record(exchange);
            return;
        };
        self.last_mid = Some(mid);

        let (bid_target, ask_target) = quote_targets(mid, self.position, &self.config);
        let (bid_qty, ask_qty) = quote_sizes(self.position, &self.config);

        let open_bid = self.open_bid;
        if let Some(quote) =
            self.maintain_quote(exchange, Side::Buy, open_bid, bid_target, bid_qty).await
        {
            self.open_bid = quote;
        } else {
            return; // exchange gone
        }
        let open_ask = self.open_ask;
        if let Some(quote) =
            self.maintain_quote(exchange, Side::Sell, open_ask, ask_target, ask_qty).await
        {
            self.open_ask = quote;
        } else {
            return;
        }

        self.record(exchange);
    }

    /// Cancel-then-resubmit when the resting quote drifted past the
    /// tolerance. The cancel is best-effort: a fill that beat it is
    /// picked up from the fill channel on the next tick.
    async fn maintain_quote(
        &mut self,
        exchange: &ExchangeHandle,
        side: Side,
        open: Option<OpenQuote>,
        target: Decimal,
        quantity: Decimal,
    ) -> Option<Option<OpenQuote>> {
        let target = target.round_dp(1);
        if let Some(quote) = open {
            if (quote.price - target).abs() <= self.config.requote_tolerance {
                return Some(Some(quote));
            }
            // A cancel only fails when the exchange is gone.
            if exchange.cancel(quote.id).await.is_err() {
                return None;
            }
        }

        if quantity <= Decimal::ZERO || target <= Decimal::ZERO {
            return Some(None);
        }

        let request = OrderRequest {
            side,
            order_type: OrderType::Limit,
            price: Some(target),
            quantity,
            owner: Owner::Agent(self.config.name.clone()),
        };
        match exchange.submit(request).await {
            Ok(outcome) if outcome.resting => {
                Some(Some(OpenQuote { id: outcome.order_id, price: target }))
            }
            // Fully filled on arrival; the taker fills come back on the
            // fill channel and are drained next tick.
            Ok(_) => Some(None),
            Err(SubmitError::Rejected(err)) => {
                warn!(%err, agent = %self.config.name, "quote rejected");
                Some(None)
            }
            Err(SubmitError::Closed) => None,
        }
    }

    fn record(&self, exchange: &ExchangeHandle) {
        let Some(mid) = self.last_mid else { return };
        let pnl = self.realized_pnl() + self.mark_to_market_pnl(mid);
        exchange.record_agent_state(&self.config.name, self.position, pnl);
    }
}

pub async fn run_maker(mut agent: MarketMakerAgent, exchange: ExchangeHandle) {
    let mut ticker = interval(agent.config.tick);
    debug!(agent = %agent.config.name, "market maker starting");
    loop {
        ticker.tick().await;
        agent.tick(&exchange).await;
    }
}
