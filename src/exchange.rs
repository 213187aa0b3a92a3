use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::book::{CancelOutcome, OrderBook};
use crate::domain::{BookSnapshot, Order, OrderRequest, Owner, Side, TimedPoint, Trade, ValidationError};

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Submission queue depth.
    pub queue_depth: usize,
    /// Cap on every stored time series and the trade tape.
    pub max_history: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self { queue_depth: 1024, max_history: 4096 }
    }
}

/// Notification that one of the owner's orders traded. Emitted once per
/// trade, for both the maker and the taker side of the match.
#[derive(Debug, Clone)]
pub struct Fill {
    pub order_id: u64,
    /// Side of the owned order, not of the aggressor.
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    /// True when the order is no longer live after this fill.
    pub done: bool,
    pub trade_seq: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SubmitOutcome {
    pub order_id: u64,
    pub trades: Vec<Trade>,
    /// Whether a resting remainder was created.
    pub resting: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum CancelReply {
    Cancelled,
    /// Order id was not resting; the cancel was a no-op.
    Unknown,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("order rejected: {0}")]
    Rejected(#[from] ValidationError),
    #[error("exchange is shut down")]
    Closed,
}

enum Command {
    Submit {
        request: OrderRequest,
        reply: oneshot::Sender<Result<SubmitOutcome, ValidationError>>,
    },
    Cancel {
        order_id: u64,
        reply: oneshot::Sender<CancelReply>,
    },
}

#[derive(Default)]
struct AgentSeries {
    pnl: VecDeque<TimedPoint>,
    position: VecDeque<TimedPoint>,
}

#[derive(Default)]
struct History {
    mid_prices: VecDeque<TimedPoint>,
    trades: VecDeque<Trade>,
    agents: HashMap<String, AgentSeries>,
}

fn push_capped<T>(series: &mut VecDeque<T>, max: usize, value: T) {
    series.push_back(value);
    while series.len() > max {
        series.pop_front();
    }
}

#[derive(Default)]
struct Shared {
    snapshot: RwLock<BookSnapshot>,
    history: RwLock<History>,
    fills: RwLock<HashMap<Owner, mpsc::UnboundedSender<Fill>>>,
}

/// Handle to the exchange. The book itself lives inside a dedicated
/// task; all mutation is funneled through one command channel, so
/// submissions are matched strictly in arrival order with at most one
/// apply in flight.
#[derive(Clone)]
pub struct ExchangeHandle {
    tx: mpsc::Sender<Command>,
    shared: Arc<Shared>,
    max_history: usize,
}

pub struct Exchange;

impl Exchange {
    pub fn spawn(config: ExchangeConfig) -> ExchangeHandle {
        let (tx, rx) = mpsc::channel(config.queue_depth);
        let shared = Arc::new(Shared::default());
        let max_history = config.max_history;
        tokio::spawn(run_engine(rx, shared.clone(), config));
        ExchangeHandle { tx, shared, max_history }
    }
}

impl ExchangeHandle {
    /// Enqueues an order. The caller suspends only while waiting for its
    /// own submission's outcome, never inside the matching section.
    pub async fn submit(&self, request: OrderRequest) -> Result<SubmitOutcome, SubmitError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Submit { request, reply })
            .await
            .map_err(|_| SubmitError::Closed)?;
        rx.await.map_err(|_| SubmitError::Closed)?.map_err(SubmitError::Rejected)
    }

    /// Best-effort cancel: an id already filled or cancelled resolves to
    /// `CancelReply::Unknown` rather than an error.
    pub async fn cancel(&self, order_id: u64) -> Result<CancelReply, SubmitError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Cancel { order_id, reply })
            .await
            .map_err(|_| SubmitError::Closed)?;
        rx.await.map_err(|_| SubmitError::Closed)
    }

    /// Registers a fill channel for an owner. Named agents also get a
    /// reporting series so they appear in the agent listing.
    pub fn subscribe_fills(&self, owner: Owner) -> mpsc::UnboundedReceiver<Fill> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Owner::Agent(name) = &owner {
            self.shared
                .history
                .write()
                .unwrap()
                .agents
                .entry(name.clone())
                .or_default();
        }
        self.shared.fills.write().unwrap().insert(owner, tx);
        rx
    }

    pub fn snapshot(&self) -> BookSnapshot {
        self.shared.snapshot.read().unwrap().clone()
    }

    pub fn mid_price_history(&self) -> Vec<TimedPoint> {
        self.shared.history.read().unwrap().mid_prices.iter().cloned().collect()
    }

    pub fn recent_trades(&self) -> Vec<Trade> {
        self.shared.history.read().unwrap().trades.iter().cloned().collect()
    }

    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.shared.history.read().unwrap().agents.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn agent_pnl(&self, name: &str) -> Option<Vec<TimedPoint>> {
        let history = self.shared.history.read().unwrap();
        history.agents.get(name).map(|s| s.pnl.iter().cloned().collect())
    }

    pub fn agent_position(&self, name: &str) -> Option<Vec<TimedPoint>> {
        let history = self.shared.history.read().unwrap();
        history.agents.get(name).map(|s| s.position.iter().cloned().collect())
    }

    /// Appends one accounting row for an agent. Called by the agent
    /// after each decision tick.
    pub fn record_agent_state(&self, name: &str, position: Decimal, pnl: Decimal) {
        let mut history = self.shared.history.write().unwrap();
        let max = self.max_history;
        let series = history.agents.entry(name.to_owned()).or_default();
        push_capped(&mut series.position, max, TimedPoint::now(position));
        push_capped(&mut series.pnl, max, TimedPoint::now(pnl));
    }
}

async fn run_engine(mut rx: mpsc::Receiver<Command>, shared: Arc<Shared>, config: ExchangeConfig) {
    let mut book = OrderBook::new();
    let mut owners: HashMap<u64, Owner> = HashMap::new();
    let mut next_order_id: u64 = 1;
    let mut next_submit_seq: u64 = 1;
    let mut last_trade_price: Option<Decimal> = None;
    let mut last_seq: u64 = 0;

    while let Some(command) = rx.recv().await {
        match command {
            Command::Submit { request, reply } => {
                if let Err(err) = request.validate() {
                    debug!(%err, "submission rejected");
                    let _ = reply.send(Err(err));
                    continue;
                }

                let id = next_order_id;
                next_order_id += 1;
                let seq = next_submit_seq;
                next_submit_seq += 1;
                last_seq = seq;

                let owner = request.owner.clone();
                let taker_side = request.side;
                let order: Order = request.into_order(id, seq);
                owners.insert(id, owner.clone());

                let result = book.apply(order);
                if let Some(last) = result.trades.last() {
                    last_trade_price = Some(last.price);
                }

                route_fills(
                    &shared,
                    &mut owners,
                    &book,
                    &result.trades,
                    id,
                    taker_side,
                    result.resting_order_id.is_some(),
                );
                if result.resting_order_id.is_none() {
                    owners.remove(&id);
                }

                publish(&shared, &book, &config, last_seq, last_trade_price, &result.trades);

                let _ = reply.send(Ok(SubmitOutcome {
                    order_id: id,
                    trades: result.trades,
                    resting: result.resting_order_id.is_some(),
                }));
            }
            Command::Cancel { order_id, reply } => {
                let outcome = match book.cancel(order_id) {
                    CancelOutcome::Cancelled(order) => {
                        owners.remove(&order.id);
                        // The cancel changed the book, so it consumes a
                        // sequence number like any other apply.
                        last_seq = next_submit_seq;
                        next_submit_seq += 1;
                        publish(&shared, &book, &config, last_seq, last_trade_price, &[]);
                        CancelReply::Cancelled
                    }
                    CancelOutcome::Unknown => CancelReply::Unknown,
                };
                let _ = reply.send(outcome);
            }
        }
    }
    debug!("all exchange handles dropped, engine stopping");
}

/// Delivers one fill per trade to the maker's and the taker's owner.
/// Owners without a registered channel (the generator) are skipped.
fn route_fills(
    shared: &Shared,
    owners: &mut HashMap<u64, Owner>,
    book: &OrderBook,
    trades: &[Trade],
    taker_id: u64,
    taker_side: Side,
    taker_resting: bool,
) {
    let mut dead = Vec::new();
    {
        let channels = shared.fills.read().unwrap();
        for (i, trade) in trades.iter().enumerate() {
            let maker_done = !book.contains(trade.maker_order_id);
            if let Some(owner) = owners.get(&trade.maker_order_id) {
                if let Some(tx) = channels.get(owner) {
                    let fill = Fill {
                        order_id: trade.maker_order_id,
                        side: taker_side.opposite(),
                        price: trade.price,
                        quantity: trade.quantity,
                        done: maker_done,
                        trade_seq: trade.seq,
                        timestamp: trade.timestamp,
                    };
                    if tx.send(fill).is_err() {
                        dead.push(owner.clone());
                    }
                }
            }

            let taker_done = i == trades.len() - 1 && !taker_resting;
            if let Some(owner) = owners.get(&taker_id) {
                if let Some(tx) = channels.get(owner) {
                    let fill = Fill {
                        order_id: taker_id,
                        side: taker_side,
                        price: trade.price,
                        quantity: trade.quantity,
                        done: taker_done,
                        trade_seq: trade.seq,
                        timestamp: trade.timestamp,
                    };
                    if tx.send(fill).is_err() {
                        dead.push(owner.clone());
                    }
                }
            }
        }
    }
    for trade in trades {
        if !book.contains(trade.maker_order_id) {
            owners.remove(&trade.maker_order_id);
        }
    }
    if !dead.is_empty() {
        let mut channels = shared.fills.write().unwrap();
        for owner in dead {
            warn!(?owner, "fill receiver dropped, unsubscribing");
            channels.remove(&owner);
        }
    }
}

/// Replaces the published snapshot and appends history rows. Readers
/// always see a whole pre- or post-apply view, never a partial one.
fn publish(
    shared: &Shared,
    book: &OrderBook,
    config: &ExchangeConfig,
    seq: u64,
    last_trade_price: Option<Decimal>,
    new_trades: &[Trade],
) {
    let snapshot = book.snapshot(seq, last_trade_price);
    let mid = snapshot.mid_price();
    *shared.snapshot.write().unwrap() = snapshot;

    let mut history = shared.history.write().unwrap();
    if let Some(mid) = mid {
        push_capped(&mut history.mid_prices, config.max_history, TimedPoint::now(mid));
    }
    for trade in new_trades {
        push_capped(&mut history.trades, config.max_history, trade.clone());
    }
}
