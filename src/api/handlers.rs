// HTTP/WS handlers: thin translation between axum and the matching engine's
// typed operations. Every handler maps `EngineError` to the status codes
// spec §6/§7 names; no matching/minting/position logic lives here.

use axum::{
    extract::{Path, State, WebSocketUpgrade, ws::{Message, WebSocket}},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use uuid::Uuid;
use tracing::{error, info};

use crate::errors::EngineError;
use crate::types::{
    CancelOrderRequest, CreateMarketRequest, ResolveMarketRequest, SubmitLimitOrderRequest,
    SubmitMarketOrderRequest, WebSocketMessage,
};
use crate::AppState;

fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::Precondition(_) => StatusCode::BAD_REQUEST,
        EngineError::Authorization(_) => StatusCode::FORBIDDEN,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: EngineError) -> Response {
    let status = status_for(&err);
    if matches!(err, EngineError::Internal(_)) {
        error!("internal error: {err}");
    }
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "service": "orderbook" }))
}

pub async fn create_market(State(state): State<AppState>, Json(req): Json<CreateMarketRequest>) -> Response {
    match state.matching_engine.create_market(req.title, req.description).await {
        Ok(market) => (StatusCode::CREATED, Json(market)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn list_markets(State(state): State<AppState>) -> Response {
    match state.matching_engine.list_markets().await {
        Ok(markets) => Json(markets).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_market(State(state): State<AppState>, Path(market_id): Path<Uuid>) -> Response {
    match state.matching_engine.get_market(market_id).await {
        Ok(market) => Json(market).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn submit_limit_order(
    State(state): State<AppState>,
    Path(market_id): Path<Uuid>,
    Json(mut req): Json<SubmitLimitOrderRequest>,
) -> Response {
    req.market_id = market_id;
    info!(market_id = %market_id, user_id = %req.user_id, "submitting limit order");
    match state.matching_engine.submit_limit(req).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn submit_market_order(
    State(state): State<AppState>,
    Path(market_id): Path<Uuid>,
    Json(mut req): Json<SubmitMarketOrderRequest>,
) -> Response {
    req.market_id = market_id;
    info!(market_id = %market_id, user_id = %req.user_id, "submitting market order");
    match state.matching_engine.submit_market(req).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path((market_id, order_id)): Path<(Uuid, Uuid)>,
    Json(mut req): Json<CancelOrderRequest>,
) -> Response {
    req.order_id = order_id;
    match state.matching_engine.cancel(market_id, req).await {
        Ok(()) => Json(json!({ "cancelled": true })).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_orderbook(State(state): State<AppState>, Path(market_id): Path<Uuid>) -> Response {
    match state.matching_engine.snapshot(market_id).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn resolve_market(
    State(state): State<AppState>,
    Path(market_id): Path<Uuid>,
    Json(req): Json<ResolveMarketRequest>,
) -> Response {
    match state.matching_engine.resolve(market_id, req).await {
        Ok(market) => Json(market).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn delete_market(State(state): State<AppState>, Path(market_id): Path<Uuid>) -> Response {
    match state.matching_engine.delete(market_id).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_response(e),
    }
}

/// Upgrades to a per-market room: the subscribing socket gets the current
/// snapshot immediately, then every `orderbook_update`/`trade_executed`
/// published to this market's room for as long as the connection lives.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(market_id): Path<Uuid>,
) -> Response {
    ws.on_upgrade(move |socket| websocket_connection(socket, state, market_id))
}

async fn websocket_connection(socket: WebSocket, state: AppState, market_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let mut room_rx = state.events.room(market_id).await.subscribe();

    if let Ok(snapshot) = state.matching_engine.snapshot(market_id).await {
        let initial = WebSocketMessage::OrderbookUpdate { market_id, snapshot };
        if let Ok(text) = serde_json::to_string(&initial) {
            let _ = sender.send(Message::Text(text)).await;
        }
    }

    let send_task = tokio::spawn(async move {
        while let Ok(message) = room_rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(t) => t,
                Err(e) => {
                    error!("failed to serialize websocket message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }
    info!(market_id = %market_id, "websocket connection closed");
}
