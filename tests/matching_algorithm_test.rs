// Core matching/minting scenarios, driven against the real engine end to
// end (in-memory storage, in-memory token ledger, no HTTP layer). Mirrors
// the literal S1-S6 scenarios and the quantified invariants.

use std::sync::Arc;

use orderbook_service::errors::EngineError;
use orderbook_service::ledger::{InMemoryTokenLedger, TokenLedger};
use orderbook_service::matching::events::EventBus;
use orderbook_service::matching::MatchingEngine;
use orderbook_service::storage;
use orderbook_service::types::{
    CancelOrderRequest, Market, MarketStatus, Outcome, OrderSide, OrderStatus,
    ResolveMarketRequest, SubmitLimitOrderRequest, SubmitMarketOrderRequest, TradeKind,
};

const STARTING_BALANCE: u64 = 1_000_000;

async fn setup() -> (MatchingEngine, Arc<InMemoryTokenLedger>, Market) {
    let database = storage::create_test_database().await.unwrap();
    let ledger = Arc::new(InMemoryTokenLedger::new(STARTING_BALANCE));
    let events = Arc::new(EventBus::new());
    let engine = MatchingEngine::new(database, ledger.clone(), events);
    let market = engine.create_market("Will it rain".to_string(), "tomorrow".to_string()).await.unwrap();
    (engine, ledger, market)
}

fn limit(
    market_id: uuid::Uuid,
    user_id: &str,
    outcome: Outcome,
    side: OrderSide,
    price_cents: u32,
    quantity: u64,
) -> SubmitLimitOrderRequest {
    SubmitLimitOrderRequest { market_id, user_id: user_id.to_string(), outcome, side, price_cents, quantity }
}

#[tokio::test]
async fn s1_limit_cross_at_maker_price() {
    let (engine, ledger, market) = setup().await;

    engine.submit_limit(limit(market.market_id, "alice", Outcome::Yes, OrderSide::Sell, 60, 10)).await.unwrap();
    let resp = engine.submit_limit(limit(market.market_id, "bob", Outcome::Yes, OrderSide::Buy, 70, 4)).await.unwrap();

    assert_eq!(resp.status, OrderStatus::Filled);
    assert_eq!(resp.filled_quantity, 4);
    assert_eq!(resp.matches.len(), 1);
    assert_eq!(resp.matches[0].price_cents, 60);
    assert_eq!(resp.matches[0].quantity, 4);
    assert_eq!(resp.matches[0].kind, TradeKind::Match);

    let snapshot = engine.snapshot(market.market_id).await.unwrap();
    assert_eq!(snapshot.yes.asks[0].price_cents, 60);
    assert_eq!(snapshot.yes.asks[0].quantity, 6);

    // alice sold 4 shares for 0.60 each = 240 cents; bob paid the same.
    assert_eq!(ledger.balance("alice"), STARTING_BALANCE + 240);
    assert_eq!(ledger.balance("bob"), STARTING_BALANCE - 240);
}

#[tokio::test]
async fn s2_mint_on_complementary_buys() {
    let (engine, ledger, market) = setup().await;

    let resp_a = engine.submit_limit(limit(market.market_id, "alice", Outcome::Yes, OrderSide::Buy, 40, 5)).await.unwrap();
    assert_eq!(resp_a.status, OrderStatus::Open);

    let resp_b = engine.submit_limit(limit(market.market_id, "bob", Outcome::No, OrderSide::Buy, 60, 3)).await.unwrap();
    assert_eq!(resp_b.status, OrderStatus::Filled);
    assert_eq!(resp_b.matches.len(), 1);
    assert_eq!(resp_b.matches[0].kind, TradeKind::Mint);

    // alice's resting order should now show 3 filled, 2 remaining (PARTIAL).
    let snapshot = engine.snapshot(market.market_id).await.unwrap();
    assert_eq!(snapshot.yes.bids[0].price_cents, 40);
    assert_eq!(snapshot.yes.bids[0].quantity, 2);

    assert_eq!(ledger.balance("alice"), STARTING_BALANCE - 120); // 3 * 0.40
    assert_eq!(ledger.balance("bob"), STARTING_BALANCE - 180); // 3 * 0.60
    assert_eq!(snapshot.midpoint_yes_cents, 40);
}

#[tokio::test]
async fn s3_no_mint_on_off_sum_prices() {
    let (engine, _ledger, market) = setup().await;

    engine.submit_limit(limit(market.market_id, "alice", Outcome::Yes, OrderSide::Buy, 40, 5)).await.unwrap();
    let resp_b = engine.submit_limit(limit(market.market_id, "bob", Outcome::No, OrderSide::Buy, 55, 5)).await.unwrap();

    assert_eq!(resp_b.status, OrderStatus::Open);
    assert!(resp_b.matches.is_empty());

    let snapshot = engine.snapshot(market.market_id).await.unwrap();
    assert_eq!(snapshot.yes.bids[0].quantity, 5);
    assert_eq!(snapshot.no.bids[0].quantity, 5);
}

#[tokio::test]
async fn s4_market_buy_sweeps_by_budget() {
    let (engine, _ledger, market) = setup().await;

    engine.submit_limit(limit(market.market_id, "alice", Outcome::Yes, OrderSide::Sell, 50, 2)).await.unwrap();
    engine.submit_limit(limit(market.market_id, "carol", Outcome::Yes, OrderSide::Sell, 55, 10)).await.unwrap();

    let resp = engine
        .submit_market(SubmitMarketOrderRequest {
            market_id: market.market_id,
            user_id: "dave".to_string(),
            outcome: Outcome::Yes,
            side: OrderSide::Buy,
            amount: 500,
        })
        .await
        .unwrap();

    assert_eq!(resp.shares_filled, 9);
    assert_eq!(resp.cents_spent, 485);

    let snapshot = engine.snapshot(market.market_id).await.unwrap();
    assert_eq!(snapshot.yes.asks.len(), 1);
    assert_eq!(snapshot.yes.asks[0].price_cents, 55);
    assert_eq!(snapshot.yes.asks[0].quantity, 3);
}

#[tokio::test]
async fn s5_resolve_pays_winning_side_only() {
    let (engine, ledger, market) = setup().await;

    engine.submit_limit(limit(market.market_id, "seller", Outcome::Yes, OrderSide::Sell, 50, 13)).await.unwrap();
    engine.submit_limit(limit(market.market_id, "u1", Outcome::Yes, OrderSide::Buy, 50, 10)).await.unwrap();
    engine.submit_limit(limit(market.market_id, "u3", Outcome::Yes, OrderSide::Buy, 50, 3)).await.unwrap();

    engine.submit_limit(limit(market.market_id, "seller_no", Outcome::No, OrderSide::Sell, 50, 7)).await.unwrap();
    engine.submit_limit(limit(market.market_id, "u2", Outcome::No, OrderSide::Buy, 50, 5)).await.unwrap();
    engine.submit_limit(limit(market.market_id, "u3", Outcome::No, OrderSide::Buy, 50, 2)).await.unwrap();

    let before_u1 = ledger.balance("u1");
    let before_u2 = ledger.balance("u2");
    let before_u3 = ledger.balance("u3");

    let resolved = engine.resolve(market.market_id, ResolveMarketRequest { outcome: Outcome::Yes }).await.unwrap();
    assert_eq!(resolved.status, MarketStatus::Resolved);
    assert_eq!(resolved.resolved_outcome, Some(Outcome::Yes));

    assert_eq!(ledger.balance("u1"), before_u1 + 1000); // 10 YES shares * $1
    assert_eq!(ledger.balance("u2"), before_u2); // 0 YES shares held
    assert_eq!(ledger.balance("u3"), before_u3 + 300); // 3 YES shares

    // every resting order, including the resting NO sells with no remaining
    // counterparty, is cancelled on resolve.
    let snapshot = engine.snapshot(market.market_id).await.unwrap();
    assert!(snapshot.yes.bids.is_empty() && snapshot.yes.asks.is_empty());
    assert!(snapshot.no.bids.is_empty() && snapshot.no.asks.is_empty());
}

#[tokio::test]
async fn s6_cancel_requires_ownership() {
    let (engine, _ledger, market) = setup().await;
    let resp = engine.submit_limit(limit(market.market_id, "u1", Outcome::Yes, OrderSide::Buy, 40, 5)).await.unwrap();

    let result = engine
        .cancel(market.market_id, CancelOrderRequest { order_id: resp.order_id, user_id: "u2".to_string() })
        .await;
    assert!(matches!(result, Err(EngineError::Authorization(_))));

    let snapshot = engine.snapshot(market.market_id).await.unwrap();
    assert_eq!(snapshot.yes.bids[0].quantity, 5);
}

#[tokio::test]
async fn fifo_at_same_price_level() {
    let (engine, _ledger, market) = setup().await;

    let first = engine.submit_limit(limit(market.market_id, "first", Outcome::Yes, OrderSide::Sell, 50, 5)).await.unwrap();
    engine.submit_limit(limit(market.market_id, "second", Outcome::Yes, OrderSide::Sell, 50, 5)).await.unwrap();

    let resp = engine.submit_limit(limit(market.market_id, "taker", Outcome::Yes, OrderSide::Buy, 50, 5)).await.unwrap();
    assert_eq!(resp.matches.len(), 1);
    assert_eq!(resp.matches[0].counterparty, "first");
    assert_ne!(first.order_id, resp.order_id);
}

#[tokio::test]
async fn rejects_price_out_of_range() {
    let (engine, _ledger, market) = setup().await;
    let result = engine.submit_limit(limit(market.market_id, "u1", Outcome::Yes, OrderSide::Buy, 0, 1)).await;
    assert!(matches!(result, Err(EngineError::Validation(_))));

    let result = engine.submit_limit(limit(market.market_id, "u1", Outcome::Yes, OrderSide::Buy, 100, 1)).await;
    assert!(matches!(result, Err(EngineError::Validation(_))));
}

#[tokio::test]
async fn rejects_sell_without_shares() {
    let (engine, _ledger, market) = setup().await;
    let result = engine.submit_limit(limit(market.market_id, "nobody", Outcome::Yes, OrderSide::Sell, 50, 10)).await;
    assert!(matches!(result, Err(EngineError::Precondition(_))));
}

#[tokio::test]
async fn resolve_twice_is_a_precondition_error() {
    let (engine, _ledger, market) = setup().await;
    engine.resolve(market.market_id, ResolveMarketRequest { outcome: Outcome::Yes }).await.unwrap();
    let second = engine.resolve(market.market_id, ResolveMarketRequest { outcome: Outcome::No }).await;
    assert!(matches!(second, Err(EngineError::Precondition(_))));
}
