//! HTTP placement/cancel/admission surface. Wire shapes follow §6 of the
//! matching core's interface contract; error responses follow the
//! `{error, code}` shape the teacher's `accounts::routes::internal` and
//! `gateway::server` handlers already use.

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router};
use clob_core::{CoreError, OrderMode, PlaceOrderRequest, Side, Tif, TradingPair};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", axum::routing::get(health))
        .route("/api/pairs", axum::routing::post(admit_pair))
        .route("/api/orders", axum::routing::post(place_order))
        .route("/api/orders/cancel", axum::routing::post(cancel_order))
        .route("/api/orders/book/:pair", axum::routing::get(orderbook_snapshot))
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct AdmitPairRequest {
    base: String,
    quote: String,
}

#[derive(Debug, Serialize)]
struct AdmitPairResponse {
    pair: String,
}

async fn admit_pair(
    State(state): State<AppState>,
    Json(req): Json<AdmitPairRequest>,
) -> Json<AdmitPairResponse> {
    let pair = TradingPair { base: req.base, quote: req.quote }.symbol();
    state.admit_pair(&pair).await;
    Json(AdmitPairResponse { pair })
}

#[derive(Debug, Deserialize)]
struct PlaceOrderBody {
    owner: String,
    pair: String,
    side: Side,
    mode: OrderMode,
    #[serde(default)]
    price: Option<String>,
    quantity: String,
    #[serde(default)]
    tif: Option<Tif>,
    #[serde(default)]
    stop_loss: Option<String>,
    #[serde(default)]
    take_profit: Option<String>,
    #[serde(default = "Uuid::new_v4")]
    client_nonce: Uuid,
}

#[derive(Debug, Serialize)]
struct PlaceOrderResponse {
    order_id: Uuid,
    status: &'static str,
    filled: Decimal,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, (StatusCode, Json<ErrorBody>)> {
    Decimal::from_str(value).map_err(|_| {
        error_response(CoreError::BadDecimal(format!("{field}: {value}")))
    })
}

fn error_response(err: CoreError) -> (StatusCode, Json<ErrorBody>) {
    let status = match &err {
        CoreError::BadRequest(_) | CoreError::UnknownPair(_) | CoreError::BadDecimal(_) => StatusCode::BAD_REQUEST,
        CoreError::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::NotOwner => StatusCode::FORBIDDEN,
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::AlreadyTerminal | CoreError::FokUnfillable | CoreError::NoLiquidity => StatusCode::CONFLICT,
        CoreError::LedgerUnavailable | CoreError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::LockInvalid | CoreError::IndexCorrupt => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
            code: err.code(),
        }),
    )
}

async fn place_order(
    State(state): State<AppState>,
    Json(body): Json<PlaceOrderBody>,
) -> Result<Json<PlaceOrderResponse>, (StatusCode, Json<ErrorBody>)> {
    let price = body
        .price
        .as_deref()
        .map(|p| parse_decimal("price", p))
        .transpose()?;
    let quantity = parse_decimal("quantity", &body.quantity)?;
    let stop_loss = body
        .stop_loss
        .as_deref()
        .map(|p| parse_decimal("stop_loss", p))
        .transpose()?;
    let take_profit = body
        .take_profit
        .as_deref()
        .map(|p| parse_decimal("take_profit", p))
        .transpose()?;

    let handle = state.admit_pair(&body.pair).await;

    let req = PlaceOrderRequest {
        owner: body.owner,
        pair: body.pair,
        side: body.side,
        mode: body.mode,
        price,
        quantity,
        tif: body.tif.unwrap_or_default(),
        stop_loss,
        take_profit,
        client_nonce: body.client_nonce.to_string(),
    };

    let order = handle.place(req).await.map_err(error_response)?;
    Ok(Json(PlaceOrderResponse {
        order_id: order.id,
        status: match order.status {
            clob_core::OrderStatus::Open => "OPEN",
            clob_core::OrderStatus::Filled => "FILLED",
            clob_core::OrderStatus::Cancelled => "CANCELLED",
            clob_core::OrderStatus::Rejected => "REJECTED",
        },
        filled: order.filled,
    }))
}

#[derive(Debug, Deserialize)]
struct CancelOrderBody {
    owner: String,
    order_id: Uuid,
    pair: String,
}

#[derive(Debug, Serialize)]
struct CancelOrderResponse {
    ok: bool,
}

async fn cancel_order(
    State(state): State<AppState>,
    Json(body): Json<CancelOrderBody>,
) -> Result<Json<CancelOrderResponse>, (StatusCode, Json<ErrorBody>)> {
    let handle = state.pair_handle(&body.pair).await.map_err(error_response)?;
    handle
        .cancel(body.order_id, body.owner)
        .await
        .map_err(error_response)?;
    Ok(Json(CancelOrderResponse { ok: true }))
}

#[derive(Debug, Serialize)]
struct OrderBookSnapshotResponse {
    pair: String,
    bids: Vec<(Decimal, Decimal)>,
    asks: Vec<(Decimal, Decimal)>,
}

async fn orderbook_snapshot(
    State(state): State<AppState>,
    axum::extract::Path(pair): axum::extract::Path<String>,
) -> Result<Json<OrderBookSnapshotResponse>, (StatusCode, Json<ErrorBody>)> {
    let handle = state.pair_handle(&pair).await.map_err(error_response)?;
    let (bids, asks) = handle.snapshot(50).await.map_err(error_response)?;
    Ok(Json(OrderBookSnapshotResponse { pair, bids, asks }))
}
