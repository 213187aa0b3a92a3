use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

mod book;
mod domain;
mod exchange;
mod flow;
mod gateway;
mod maker;

use crate::exchange::{Exchange, ExchangeConfig};
use crate::flow::{run_flow, FlowConfig, OrderFlowGenerator};
use crate::maker::{run_maker, MakerConfig, MarketMakerAgent};

#[derive(Debug, Parser)]
#[command(name = "venue-sim", about = "Simulated trading venue with a market-making agent")]
struct Args {
    #[arg(long, default_value_t = 3000)]
    port: u16,
    /// Starting reference price for the synthetic order flow.
    #[arg(long, default_value_t = 100.0)]
    initial_price: f64,
    #[arg(long, default_value_t = 50)]
    flow_tick_ms: u64,
    #[arg(long, default_value_t = 250)]
    maker_tick_ms: u64,
    /// Seed for the order-flow RNG; random when omitted.
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value = "basic-market-maker")]
    maker_name: String,
    #[arg(long, default_value = "0.2")]
    half_spread: Decimal,
    #[arg(long, default_value = "0.01")]
    skew_coeff: Decimal,
    #[arg(long, default_value = "100")]
    max_position: Decimal,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let exchange = Exchange::spawn(ExchangeConfig::default());

    let flow_config = FlowConfig {
        tick: Duration::from_millis(args.flow_tick_ms),
        initial_price: args.initial_price,
        ..FlowConfig::default()
    };
    let generator = OrderFlowGenerator::new(flow_config, args.seed);
    tokio::spawn(run_flow(generator, exchange.clone()));

    let maker_config = MakerConfig {
        name: args.maker_name,
        tick: Duration::from_millis(args.maker_tick_ms),
        half_spread: args.half_spread,
        skew_coeff: args.skew_coeff,
        max_position: args.max_position,
        ..MakerConfig::default()
    };
    let agent = MarketMakerAgent::new(maker_config, &exchange);
    tokio::spawn(run_maker(agent, exchange.clone()));

    let app = gateway::router(exchange);
    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    info!("venue simulator listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
