// HTTP/WebSocket adapter: translates the core's typed operations and
// `EngineError` taxonomy into the wire surface (§6 of the operation table).

pub mod handlers;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/markets", post(handlers::create_market))
        .route("/markets", get(handlers::list_markets))
        .route("/markets/:market_id", get(handlers::get_market))
        .route("/markets/:market_id/orders", post(handlers::submit_limit_order))
        .route("/markets/:market_id/orders/market", post(handlers::submit_market_order))
        .route("/markets/:market_id/orders/:order_id", delete(handlers::cancel_order))
        .route("/markets/:market_id/orderbook", get(handlers::get_orderbook))
        .route("/markets/:market_id/resolve", post(handlers::resolve_market))
        .route("/markets/:market_id", delete(handlers::delete_market))
        .route("/markets/:market_id/ws", get(handlers::websocket_handler))
        .with_state(state)
}
