use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post};
use axum::Router;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{BookSnapshot, OrderRequest, OrderType, Owner, Side, TimedPoint, Trade};
use crate::exchange::{CancelReply, ExchangeHandle, SubmitError};

pub fn router(exchange: ExchangeHandle) -> Router {
    Router::new()
        .route("/mid_price", get(get_mid_price))
        .route("/orderbook", get(get_orderbook))
        .route("/trades", get(get_trades))
        .route("/agents", get(get_agents))
        .route("/pnl/:agent", get(get_pnl))
        .route("/position/:agent", get(get_position))
        .route("/order", post(post_order))
        .route("/order/:id", delete(delete_order))
        .with_state(exchange)
}

async fn get_mid_price(State(exchange): State<ExchangeHandle>) -> Json<Vec<TimedPoint>> {
    Json(exchange.mid_price_history())
}

async fn get_orderbook(State(exchange): State<ExchangeHandle>) -> Json<BookSnapshot> {
    Json(exchange.snapshot())
}

async fn get_trades(State(exchange): State<ExchangeHandle>) -> Json<Vec<Trade>> {
    Json(exchange.recent_trades())
}

async fn get_agents(State(exchange): State<ExchangeHandle>) -> Json<Vec<String>> {
    Json(exchange.agent_names())
}

async fn get_pnl(
    State(exchange): State<ExchangeHandle>,
    Path(agent): Path<String>,
) -> Result<Json<Vec<TimedPoint>>, StatusCode> {
    exchange.agent_pnl(&agent).map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn get_position(
    State(exchange): State<ExchangeHandle>,
    Path(agent): Path<String>,
) -> Result<Json<Vec<TimedPoint>>, StatusCode> {
    exchange.agent_position(&agent).map(Json).ok_or(StatusCode::NOT_FOUND)
}

#[derive(Debug, Deserialize)]
pub struct SubmitOrderRequest {
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    /// Owner identity for fill routing and reporting; defaults to a
    /// shared manual identity.
    pub owner: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitOrderResponse {
    pub order_id: u64,
    pub status: String,
    pub trades: Vec<Trade>,
}

async fn post_order(
    State(exchange): State<ExchangeHandle>,
    Json(request): Json<SubmitOrderRequest>,
) -> Result<Json<SubmitOrderResponse>, (StatusCode, String)> {
    let quantity = request.quantity;
    let order = OrderRequest {
        side: request.side,
        order_type: request.order_type,
        price: request.price,
        quantity,
        owner: Owner::Agent(request.owner.unwrap_or_else(|| "manual".to_owned())),
    };
    match exchange.submit(order).await {
        Ok(outcome) => {
            let filled: Decimal = outcome.trades.iter().map(|t| t.quantity).sum();
            let status = if outcome.resting {
                if outcome.trades.is_empty() { "Open" } else { "PartiallyFilled" }
            } else if filled >= quantity {
                "Filled"
            } else if outcome.trades.is_empty() {
                "Cancelled"
            } else {
                // IOC or market partially filled, residual discarded.
                "PartiallyFilled"
            };
            Ok(Json(SubmitOrderResponse {
                order_id: outcome.order_id,
                status: status.to_owned(),
                trades: outcome.trades,
            }))
        }
        Err(SubmitError::Rejected(err)) => Err((StatusCode::BAD_REQUEST, err.to_string())),
        Err(SubmitError::Closed) => {
            Err((StatusCode::SERVICE_UNAVAILABLE, "exchange halted".to_owned()))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CancelOrderResponse {
    pub order_id: u64,
    pub status: String,
}

/// Cancellation is best-effort: an id that already filled (or never
/// existed) reports `Unknown` rather than an error.
async fn delete_order(
    State(exchange): State<ExchangeHandle>,
    Path(order_id): Path<u64>,
) -> Result<Json<CancelOrderResponse>, (StatusCode, String)> {
    match exchange.cancel(order_id).await {
        Ok(CancelReply::Cancelled) => {
            Ok(Json(CancelOrderResponse { order_id, status: "Cancelled".to_owned() }))
        }
        Ok(CancelReply::Unknown) => {
            Ok(Json(CancelOrderResponse { order_id, status: "Unknown".to_owned() }))
        }
        Err(_) => Err((StatusCode::SERVICE_UNAVAILABLE, "exchange halted".to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{Exchange, ExchangeConfig};
    use rust_decimal_macros::dec;

    fn submit(side: Side, order_type: OrderType, price: Option<Decimal>, quantity: Decimal) -> SubmitOrderRequest {
        SubmitOrderRequest { side, order_type, price, quantity, owner: None }
    }

    #[tokio::test]
    async fn resting_limit_reports_open() {
        let exchange = Exchange::spawn(ExchangeConfig::default());
        let response = post_order(
            State(exchange),
            Json(submit(Side::Buy, OrderType::Limit, Some(dec!(10)), dec!(5))),
        )
        .await
        .unwrap();
        assert_eq!(response.0.status, "Open");
    }

    #[tokio::test]
    async fn unfilled_ioc_reports_cancelled() {
        let exchange = Exchange::spawn(ExchangeConfig::default());
        let response = post_order(
            State(exchange),
            Json(submit(Side::Sell, OrderType::Ioc, Some(dec!(9)), dec!(5))),
        )
        .await
        .unwrap();
        assert_eq!(response.0.status, "Cancelled");
        assert!(response.0.trades.is_empty());
    }

    #[tokio::test]
    async fn invalid_order_maps_to_bad_request() {
        let exchange = Exchange::spawn(ExchangeConfig::default());
        let err = post_order(
            State(exchange),
            Json(submit(Side::Buy, OrderType::Limit, None, dec!(5))),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cancelling_a_resting_order_removes_it() {
        let exchange = Exchange::spawn(ExchangeConfig::default());
        let order = post_order(
            State(exchange.clone()),
            Json(submit(Side::Buy, OrderType::Limit, Some(dec!(10)), dec!(5))),
        )
        .await
        .unwrap();

        let response = delete_order(State(exchange.clone()), Path(order.0.order_id))
            .await
            .unwrap();
        assert_eq!(response.0.status, "Cancelled");
        assert!(exchange.snapshot().bids.is_empty());

        // A second cancel of the same id is a harmless no-op.
        let again = delete_order(State(exchange), Path(order.0.order_id)).await.unwrap();
        assert_eq!(again.0.status, "Unknown");
    }

    #[tokio::test]
    async fn unknown_agent_series_is_not_found() {
        let exchange = Exchange::spawn(ExchangeConfig::default());
        let err = get_pnl(State(exchange), Path("ghost".to_owned())).await.unwrap_err();
        assert_eq!(err, StatusCode::NOT_FOUND);
    }
}
