// Binary prediction-market exchange: continuous limit order book, share
// minting, market-order sweeps, and real-time orderbook/trade push over a
// thin axum HTTP/WS surface.

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter, prelude::*};

use orderbook_service::{
    api,
    ledger::InMemoryTokenLedger,
    matching::{events::EventBus, MatchingEngine},
    storage, AppState,
};

const STARTING_BALANCE_CENTS: u64 = 1_000_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();

    info!("starting prediction-market orderbook service");

    let database = storage::create_database().await?;
    let ledger = Arc::new(InMemoryTokenLedger::new(STARTING_BALANCE_CENTS));
    let events = Arc::new(EventBus::new());
    let matching_engine = Arc::new(MatchingEngine::new(database.clone(), ledger.clone(), events.clone()));

    let app_state = AppState { matching_engine, database, ledger, events };

    let app = api::router(app_state).layer(CorsLayer::permissive());

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("orderbook service listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
