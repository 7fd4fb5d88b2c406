// Edge cases beyond the literal S1-S6 scenarios: delete-with-refund,
// transient balance skips, order-status invariants, and weighted-average
// cost basis across partial fills.

use std::sync::Arc;

use orderbook_service::errors::EngineError;
use orderbook_service::ledger::{InMemoryTokenLedger, TokenLedger};
use orderbook_service::matching::events::EventBus;
use orderbook_service::matching::MatchingEngine;
use orderbook_service::storage;
use orderbook_service::types::{
    CancelOrderRequest, Market, Outcome, OrderSide, OrderStatus, SubmitLimitOrderRequest,
    SubmitMarketOrderRequest,
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

async fn setup_with_balance(starting: u64) -> (MatchingEngine, Arc<InMemoryTokenLedger>, Market) {
    let database = storage::create_test_database().await.unwrap();
    let ledger = Arc::new(InMemoryTokenLedger::new(starting));
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
async fn partial_fill_then_fill_tracks_weighted_average_cost() {
    let (engine, _ledger, market) = setup().await;

    engine.submit_limit(limit(market.market_id, "s1", Outcome::Yes, OrderSide::Sell, 40, 4)).await.unwrap();
    engine.submit_limit(limit(market.market_id, "s2", Outcome::Yes, OrderSide::Sell, 60, 6)).await.unwrap();

    let resp = engine.submit_limit(limit(market.market_id, "buyer", Outcome::Yes, OrderSide::Buy, 60, 10)).await.unwrap();
    assert_eq!(resp.status, OrderStatus::Filled);
    assert_eq!(resp.matches.len(), 2);
    // 4 shares @ 0.40 + 6 shares @ 0.60 = weighted avg (160 + 360) / 10 = 52
    let total_cost: u64 = resp.matches.iter().map(|m| m.price_cents as u64 * m.quantity).sum();
    assert_eq!(total_cost, 160 + 360);
}

#[tokio::test]
async fn market_sell_skips_buyer_who_can_no_longer_afford() {
    // two BUY makers rest at the same price; the first can't afford its
    // share of a market sell once its balance has moved, so the sweep
    // should fall through to the second without aborting.
    let (engine, ledger, market) = setup().await;

    // give the seller 5 YES shares via a direct cross, before any of the
    // resting bids below exist to avoid them absorbing this fill instead.
    engine.submit_limit(limit(market.market_id, "source", Outcome::Yes, OrderSide::Sell, 50, 5)).await.unwrap();
    engine.submit_limit(limit(market.market_id, "seller", Outcome::Yes, OrderSide::Buy, 50, 5)).await.unwrap();

    engine.submit_limit(limit(market.market_id, "rich", Outcome::Yes, OrderSide::Buy, 50, 5)).await.unwrap();
    let rich_balance = ledger.balance("rich");
    ledger.debit("rich", rich_balance - 1).unwrap(); // leaves 1 cent, can't afford 50-cent fills anymore
    engine.submit_limit(limit(market.market_id, "also_rich", Outcome::Yes, OrderSide::Buy, 50, 5)).await.unwrap();

    let resp = engine
        .submit_market(SubmitMarketOrderRequest {
            market_id: market.market_id,
            user_id: "seller".to_string(),
            outcome: Outcome::Yes,
            side: OrderSide::Sell,
            amount: 5,
        })
        .await
        .unwrap();

    // "rich" is skipped (transient, not surfaced); "also_rich" absorbs the fill.
    assert_eq!(resp.shares_filled, 5);
}

#[tokio::test]
async fn cancel_on_filled_order_is_a_precondition_error() {
    let (engine, _ledger, market) = setup().await;
    engine.submit_limit(limit(market.market_id, "seller", Outcome::Yes, OrderSide::Sell, 50, 5)).await.unwrap();
    let resp = engine.submit_limit(limit(market.market_id, "buyer", Outcome::Yes, OrderSide::Buy, 50, 5)).await.unwrap();
    assert_eq!(resp.status, OrderStatus::Filled);

    let result = engine
        .cancel(market.market_id, CancelOrderRequest { order_id: resp.order_id, user_id: "buyer".to_string() })
        .await;
    assert!(matches!(result, Err(EngineError::Precondition(_))));
}

#[tokio::test]
async fn cancel_twice_is_idempotent_reject() {
    let (engine, _ledger, market) = setup().await;
    let resp = engine.submit_limit(limit(market.market_id, "u1", Outcome::Yes, OrderSide::Buy, 40, 5)).await.unwrap();

    engine.cancel(market.market_id, CancelOrderRequest { order_id: resp.order_id, user_id: "u1".to_string() }).await.unwrap();
    let second = engine
        .cancel(market.market_id, CancelOrderRequest { order_id: resp.order_id, user_id: "u1".to_string() })
        .await;
    assert!(matches!(second, Err(EngineError::Precondition(_))));
}

#[tokio::test]
async fn delete_refunds_positions_and_resting_buys_not_sells() {
    let (engine, ledger, market) = setup().await;

    engine.submit_limit(limit(market.market_id, "seller", Outcome::Yes, OrderSide::Sell, 50, 5)).await.unwrap();
    engine.submit_limit(limit(market.market_id, "holder", Outcome::Yes, OrderSide::Buy, 50, 5)).await.unwrap();
    // a resting BUY that never fills
    engine.submit_limit(limit(market.market_id, "resting_buyer", Outcome::No, OrderSide::Buy, 30, 4)).await.unwrap();
    // a resting SELL that never fills — per spec's accepted asymmetry, this
    // gets no refund when the market is deleted.
    engine.submit_limit(limit(market.market_id, "resting_seller", Outcome::No, OrderSide::Sell, 70, 4)).await.unwrap();

    let before_holder = ledger.balance("holder");
    let before_resting_buyer = ledger.balance("resting_buyer");
    let before_resting_seller = ledger.balance("resting_seller");

    let result = engine.delete(market.market_id).await.unwrap();

    assert_eq!(ledger.balance("holder"), before_holder + 5 * 50); // position refunded at cost basis
    assert_eq!(ledger.balance("resting_buyer"), before_resting_buyer + 4 * 30); // unfilled BUY refunded
    assert_eq!(ledger.balance("resting_seller"), before_resting_seller); // resting SELL: no refund
    assert_eq!(result.positions_refunded, 1);
    assert_eq!(result.orders_refunded, 1);

    let missing = engine.get_market(market.market_id).await;
    assert!(matches!(missing, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn market_buy_falls_back_to_mint_when_book_is_empty() {
    let (engine, ledger, market) = setup().await;

    // nothing resting on YES asks; a complementary NO buy is waiting at the
    // exact complement of the fallback mint's price (empty-book midpoint
    // 50 + 1 cent = 51, so the NO leg must sit at 49) so the market-buy's
    // fallback mint pairs against it.
    engine.submit_limit(limit(market.market_id, "no_buyer", Outcome::No, OrderSide::Buy, 49, 10)).await.unwrap();

    let resp = engine
        .submit_market(SubmitMarketOrderRequest {
            market_id: market.market_id,
            user_id: "yes_buyer".to_string(),
            outcome: Outcome::Yes,
            side: OrderSide::Buy,
            amount: 300,
        })
        .await
        .unwrap();

    assert!(resp.shares_filled > 0);
    assert!(ledger.balance("yes_buyer") < STARTING_BALANCE);
}

#[tokio::test]
async fn rejects_zero_quantity_and_zero_amount() {
    let (engine, _ledger, market) = setup().await;
    let result = engine.submit_limit(limit(market.market_id, "u1", Outcome::Yes, OrderSide::Buy, 50, 0)).await;
    assert!(matches!(result, Err(EngineError::Validation(_))));

    let result = engine
        .submit_market(SubmitMarketOrderRequest {
            market_id: market.market_id,
            user_id: "u1".to_string(),
            outcome: Outcome::Yes,
            side: OrderSide::Buy,
            amount: 0,
        })
        .await;
    assert!(matches!(result, Err(EngineError::Validation(_))));
}

#[tokio::test]
async fn insufficient_balance_rejects_buy_at_submit() {
    let (engine, _ledger, market) = setup_with_balance(10).await;
    let result = engine.submit_limit(limit(market.market_id, "poor", Outcome::Yes, OrderSide::Buy, 50, 5)).await;
    assert!(matches!(result, Err(EngineError::Precondition(_))));
}

#[tokio::test]
async fn markets_are_independent_critical_sections() {
    let database = storage::create_test_database().await.unwrap();
    let ledger = Arc::new(InMemoryTokenLedger::new(STARTING_BALANCE));
    let events = Arc::new(EventBus::new());
    let engine = MatchingEngine::new(database, ledger, events);

    let market_a = engine.create_market("A".to_string(), "".to_string()).await.unwrap();
    let market_b = engine.create_market("B".to_string(), "".to_string()).await.unwrap();

    engine.submit_limit(limit(market_a.market_id, "u1", Outcome::Yes, OrderSide::Buy, 40, 5)).await.unwrap();
    let snapshot_b = engine.snapshot(market_b.market_id).await.unwrap();
    assert!(snapshot_b.yes.bids.is_empty());
}
