//! WebSocket subscription handler. Protocol mirrors the teacher's
//! `gateway::websocket` tagged-enum `ActionMessage`: a client sends
//! `{"action":"subscribe","channel":"orderbook:BTC/USDT"}` and receives a
//! greeting snapshot followed by deltas until it unsubscribes or disconnects.

use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ActionMessage {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    Subscribed { channel: String },
    Unsubscribed { channel: String },
    Error { channel: String, reason: String },
}

pub async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(256);

    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        let Message::Text(text) = msg else { continue };
        let action: ActionMessage = match serde_json::from_str(&text) {
            Ok(a) => a,
            Err(e) => {
                let _ = out_tx
                    .send(serde_json::to_string(&ServerMessage::Error {
                        channel: String::new(),
                        reason: e.to_string(),
                    }).unwrap_or_default())
                    .await;
                continue;
            }
        };

        match action {
            ActionMessage::Subscribe { channel } => {
                if out_tx
                    .send(serde_json::to_string(&ServerMessage::Subscribed { channel: channel.clone() }).unwrap())
                    .await
                    .is_err()
                {
                    break;
                }
                spawn_channel_feed(&state, channel, out_tx.clone());
            }
            ActionMessage::Unsubscribe { channel } => {
                let _ = out_tx
                    .send(serde_json::to_string(&ServerMessage::Unsubscribed { channel }).unwrap())
                    .await;
            }
        }
    }

    writer.abort();
}

/// Depth of the top-of-book greeting snapshot sent on `orderbook:{pair}`
/// subscribe, matching the HTTP `GET /api/orders/book/:pair` snapshot depth.
const GREETING_DEPTH: usize = 50;

/// Spawns a task that forwards one channel's greeting snapshot plus every
/// subsequent event to the socket's outbound queue, until the broadcast
/// receiver lags (`SLOW_CONSUMER`) or the socket closes.
fn spawn_channel_feed(state: &AppState, channel: String, out_tx: mpsc::Sender<String>) {
    let state = state.clone();
    let event_bus = state.event_bus.clone();
    tokio::spawn(async move {
        if let Some(rest) = channel.strip_prefix("orderbook:") {
            let pair = rest.to_string();
            let snapshot = match state.pair_handle(&pair).await {
                Ok(handle) => handle.snapshot(GREETING_DEPTH).await.unwrap_or_default(),
                Err(_) => (Vec::new(), Vec::new()),
            };
            let (greeting, mut rx) = event_bus.subscribe_orderbook(&pair, snapshot).await;
            if send_json(&out_tx, &greeting).await.is_err() {
                return;
            }
            loop {
                match clob_core::next_or_slow_consumer(&mut rx).await {
                    Ok(event) => {
                        if send_json(&out_tx, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        } else if let Some(rest) = channel.strip_prefix("trades:") {
            let pair = rest.to_string();
            let (greeting, mut rx) = event_bus.subscribe_trades(&pair).await;
            if send_json(&out_tx, &greeting).await.is_err() {
                return;
            }
            loop {
                match clob_core::next_or_slow_consumer(&mut rx).await {
                    Ok(event) => {
                        if send_json(&out_tx, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        } else if let Some(rest) = channel.strip_prefix("balance:") {
            let owner = rest.to_string();
            let current = state.balances_snapshot(&owner).await;
            let (greeting, mut rx) = event_bus.subscribe_balance(&owner, current).await;
            if send_json(&out_tx, &greeting).await.is_err() {
                return;
            }
            loop {
                match clob_core::next_or_slow_consumer(&mut rx).await {
                    Ok(event) => {
                        if send_json(&out_tx, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        }
    });
}

async fn send_json<T: Serialize>(tx: &mpsc::Sender<String>, value: &T) -> Result<(), ()> {
    let text = serde_json::to_string(value).map_err(|_| ())?;
    tx.send(text).await.map_err(|_| ())
}
