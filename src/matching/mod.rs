// Matching engine facade: wires per-market orderbooks, minting, market-order
// execution, positions, the token ledger, storage, and the event bus behind
// a per-market critical section.
//
// Grounded on the teacher's `MatchingEngine` (`orderbooks: Arc<RwLock<...>>`,
// `database: Arc<dyn DatabaseTrait>`, `ws_broadcaster`), generalized from one
// condition-scoped book to two outcome books per market and from a single
// process-wide lock to a per-market `tokio::sync::Mutex`, per the
// concurrency model's per-market single-writer requirement (different
// markets must proceed in parallel).

pub mod engine;
pub mod events;
pub mod market_order;
pub mod minting;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::errors::{EngineError, EngineResult};
use crate::ledger::TokenLedger;
use crate::matching::engine::OrderBook;
use crate::matching::events::EventBus;
use crate::matching::market_order::{execute_market_buy, execute_market_sell};
use crate::matching::minting::attempt_mint;
use crate::positions::PositionService;
use crate::storage::DatabaseTrait;
use crate::types::{
    CancelOrderRequest, DeleteMarketResult, Market, MarketOrderResponse, MarketStatus, Order,
    OrderSide, OrderStatus, Outcome, OrderbookSnapshot, ResolveMarketRequest,
    SubmitLimitOrderRequest, SubmitMarketOrderRequest, SubmitOrderResponse, Trade,
    TradeExecutedEvent, TradeKind, TradeMatch, WebSocketMessage,
};

/// Both outcome books for one market, held behind a single mutex so every
/// mutating operation against the market is serialized.
struct MarketBooks {
    yes: OrderBook,
    no: OrderBook,
}

impl MarketBooks {
    fn new() -> Self {
        Self { yes: OrderBook::new(Outcome::Yes), no: OrderBook::new(Outcome::No) }
    }

    fn book(&mut self, outcome: Outcome) -> &mut OrderBook {
        match outcome {
            Outcome::Yes => &mut self.yes,
            Outcome::No => &mut self.no,
        }
    }

    /// `(this outcome's book, the opposite outcome's book)` — the shape
    /// minting and the market-buy fallback need simultaneously.
    fn books_mut(&mut self, outcome: Outcome) -> (&mut OrderBook, &mut OrderBook) {
        match outcome {
            Outcome::Yes => (&mut self.yes, &mut self.no),
            Outcome::No => (&mut self.no, &mut self.yes),
        }
    }
}

/// Per §4.1's per-fill volume rule, a MATCH trade contributes the cents
/// moved; per §4.2's "one unit per share created" rule, a MINT trade (one
/// row per mint, covering both legs) contributes one cent per share.
fn compute_volume_delta(trades: &[Trade]) -> u64 {
    trades
        .iter()
        .map(|trade| match trade.kind {
            TradeKind::Match => trade.price_cents as u64 * trade.quantity,
            TradeKind::Mint => trade.quantity,
        })
        .sum()
}

pub struct MatchingEngine {
    books: RwLock<HashMap<Uuid, Arc<Mutex<MarketBooks>>>>,
    database: Arc<dyn DatabaseTrait>,
    ledger: Arc<dyn TokenLedger>,
    positions: PositionService,
    events: Arc<EventBus>,
}

impl MatchingEngine {
    pub fn new(database: Arc<dyn DatabaseTrait>, ledger: Arc<dyn TokenLedger>, events: Arc<EventBus>) -> Self {
        Self {
            books: RwLock::new(HashMap::new()),
            positions: PositionService::new(database.clone()),
            database,
            ledger,
            events,
        }
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    /// Creates a new active market and persists it.
    pub async fn create_market(&self, title: String, description: String) -> EngineResult<Market> {
        let market = Market::new(title, description);
        self.database.insert_market(&market).await.map_err(EngineError::Internal)?;
        Ok(market)
    }

    pub async fn list_markets(&self) -> EngineResult<Vec<Market>> {
        self.database.list_markets().await.map_err(EngineError::Internal)
    }

    pub async fn get_market(&self, market_id: Uuid) -> EngineResult<Market> {
        self.database
            .get_market(market_id)
            .await
            .map_err(EngineError::Internal)?
            .ok_or_else(|| EngineError::NotFound(format!("market {market_id} not found")))
    }

    /// Returns the market's per-market lock, hydrating its books from
    /// storage's open orders on first touch.
    async fn books_for(&self, market_id: Uuid) -> EngineResult<Arc<Mutex<MarketBooks>>> {
        if let Some(books) = self.books.read().await.get(&market_id) {
            return Ok(books.clone());
        }

        let mut guard = self.books.write().await;
        if let Some(books) = guard.get(&market_id) {
            return Ok(books.clone());
        }

        let open_orders = self
            .database
            .list_open_orders_for_market(market_id)
            .await
            .map_err(EngineError::Internal)?;

        let mut books = MarketBooks::new();
        for order in open_orders {
            books.book(order.outcome).rest_order(order);
        }

        let entry = Arc::new(Mutex::new(books));
        guard.insert(market_id, entry.clone());
        Ok(entry)
    }

    async fn require_active_market(&self, market_id: Uuid) -> EngineResult<Market> {
        let market = self.get_market(market_id).await?;
        if market.status != MarketStatus::Active {
            return Err(EngineError::Precondition("market is not active".to_string()));
        }
        Ok(market)
    }

    /// Persists every touched maker order (rested, partially filled, or
    /// fully filled and removed from the book) so the in-memory book's
    /// mutations survive past this call.
    async fn persist_orders(&self, orders: impl IntoIterator<Item = Order>) -> EngineResult<()> {
        for order in orders {
            self.database.update_order(&order).await.map_err(EngineError::Internal)?;
        }
        Ok(())
    }

    async fn persist_trades(&self, trades: &[Trade]) -> EngineResult<()> {
        for trade in trades {
            self.database.insert_trade(trade).await.map_err(EngineError::Internal)?;
        }
        self.positions.apply_trades(trades).await.map_err(EngineError::Internal)?;
        Ok(())
    }

    /// Recomputes both outcome books' midpoints and writes them back to the
    /// market record, incrementing volume by the cents moved in this
    /// operation — the orderbook view's "recomputed after each engine
    /// operation" contract.
    async fn sync_market(&self, market_id: Uuid, books: &MarketBooks, volume_delta_cents: u64) -> EngineResult<()> {
        let mut market = self.get_market(market_id).await?;
        market.current_yes_price_cents = books.yes.midpoint_cents();
        market.current_no_price_cents = books.no.midpoint_cents();
        market.total_volume_cents += volume_delta_cents;
        self.database.update_market(&market).await.map_err(EngineError::Internal)?;
        Ok(())
    }

    async fn publish_snapshot(&self, market_id: Uuid, books: &MarketBooks) {
        let snapshot = OrderbookSnapshot {
            market_id,
            yes: books.yes.snapshot(50),
            no: books.no.snapshot(50),
            midpoint_yes_cents: books.yes.midpoint_cents(),
            midpoint_no_cents: books.no.midpoint_cents(),
            timestamp: Utc::now(),
        };
        self.events.publish(market_id, WebSocketMessage::OrderbookUpdate { market_id, snapshot }).await;
    }

    async fn publish_trades(&self, market_id: Uuid, trades: &[Trade]) {
        for trade in trades {
            let event = TradeExecutedEvent::from_trade(trade);
            self.events.publish(market_id, WebSocketMessage::TradeExecuted { event }).await;
        }
    }

    /// Submits a GTC limit order: mints against the opposite book first
    /// (BUY only), then matches against this outcome's book, then rests
    /// any remainder.
    pub async fn submit_limit(&self, req: SubmitLimitOrderRequest) -> EngineResult<SubmitOrderResponse> {
        if !(1..=99).contains(&req.price_cents) {
            return Err(EngineError::Validation("price_cents must be in 1..=99".to_string()));
        }
        if req.quantity == 0 {
            return Err(EngineError::Validation("quantity must be greater than zero".to_string()));
        }

        self.require_active_market(req.market_id).await?;

        if req.side == OrderSide::Buy {
            let notional = req.quantity * req.price_cents as u64;
            if self.ledger.balance(&req.user_id) < notional {
                return Err(EngineError::Precondition(format!("{} has insufficient balance", req.user_id)));
            }
        } else {
            let position = self
                .positions
                .get_or_create(&req.user_id, req.market_id)
                .await
                .map_err(EngineError::Internal)?;
            let held = match req.outcome {
                Outcome::Yes => position.yes_shares,
                Outcome::No => position.no_shares,
            };
            if held < req.quantity {
                return Err(EngineError::Precondition(format!(
                    "{} holds {held} {:?} shares, cannot sell {}",
                    req.user_id, req.outcome, req.quantity
                )));
            }
        }

        let mut incoming = Order {
            order_id: Uuid::new_v4(),
            market_id: req.market_id,
            user_id: req.user_id.clone(),
            outcome: req.outcome,
            side: req.side,
            price_cents: req.price_cents,
            quantity: req.quantity,
            filled_quantity: 0,
            status: OrderStatus::Open,
            created_at: Utc::now(),
        };

        let books_lock = self.books_for(req.market_id).await?;
        let mut books = books_lock.lock().await;

        let mut all_trades = Vec::new();
        let mut all_touched = Vec::new();

        if incoming.side == OrderSide::Buy {
            let (_, opposite) = books.books_mut(incoming.outcome);
            let (mut mint_trades, mut mint_touched) = attempt_mint(&mut incoming, opposite, self.ledger.as_ref());
            all_trades.append(&mut mint_trades);
            all_touched.append(&mut mint_touched);
        }

        let book = books.book(incoming.outcome);
        let (final_order, mut match_trades, mut match_touched) =
            book.match_limit_order(incoming, self.ledger.as_ref());
        all_trades.append(&mut match_trades);
        all_touched.append(&mut match_touched);

        self.database.insert_order(&final_order).await.map_err(EngineError::Internal)?;
        self.persist_orders(all_touched).await?;
        self.persist_trades(&all_trades).await?;

        let volume_delta = compute_volume_delta(&all_trades);
        self.sync_market(req.market_id, &books, volume_delta).await?;
        self.publish_trades(req.market_id, &all_trades).await;
        self.publish_snapshot(req.market_id, &books).await;

        let matches = all_trades
            .iter()
            .filter(|t| t.buyer_id == final_order.user_id || t.seller_id == final_order.user_id)
            .map(|t| TradeMatch {
                trade_id: t.trade_id,
                counterparty: if t.buyer_id == final_order.user_id {
                    t.seller_id.clone()
                } else {
                    t.buyer_id.clone()
                },
                price_cents: t.price_cents,
                quantity: t.quantity,
                kind: t.kind,
            })
            .collect();

        Ok(SubmitOrderResponse {
            order_id: final_order.order_id,
            status: final_order.status,
            filled_quantity: final_order.filled_quantity,
            matches,
        })
    }

    /// Sweeps the book immediately: BUY by budget, SELL by quantity.
    pub async fn submit_market(&self, req: SubmitMarketOrderRequest) -> EngineResult<MarketOrderResponse> {
        if req.amount == 0 {
            return Err(EngineError::Validation("amount must be greater than zero".to_string()));
        }

        self.require_active_market(req.market_id).await?;

        if req.side == OrderSide::Buy {
            if self.ledger.balance(&req.user_id) < req.amount {
                return Err(EngineError::Precondition(format!("{} has insufficient balance", req.user_id)));
            }
        } else {
            let position = self
                .positions
                .get_or_create(&req.user_id, req.market_id)
                .await
                .map_err(EngineError::Internal)?;
            let held = match req.outcome {
                Outcome::Yes => position.yes_shares,
                Outcome::No => position.no_shares,
            };
            if held < req.amount {
                return Err(EngineError::Precondition(format!(
                    "{} holds {held} {:?} shares, cannot sell {}",
                    req.user_id, req.outcome, req.amount
                )));
            }
        }

        let books_lock = self.books_for(req.market_id).await?;
        let mut books = books_lock.lock().await;

        let outcome = match req.side {
            OrderSide::Buy => {
                let (book, opposite) = books.books_mut(req.outcome);
                execute_market_buy(
                    &req.user_id,
                    req.market_id,
                    req.outcome,
                    req.amount,
                    book,
                    opposite,
                    self.ledger.as_ref(),
                )
            }
            OrderSide::Sell => {
                let book = books.book(req.outcome);
                execute_market_sell(&req.user_id, req.market_id, req.amount, book, self.ledger.as_ref())
            }
        };

        self.persist_orders(outcome.touched_orders.clone()).await?;
        self.persist_trades(&outcome.trades).await?;

        let volume_delta = compute_volume_delta(&outcome.trades);
        self.sync_market(req.market_id, &books, volume_delta).await?;
        self.publish_trades(req.market_id, &outcome.trades).await;
        self.publish_snapshot(req.market_id, &books).await;

        let average_price_cents =
            if outcome.shares_filled > 0 { Some((outcome.cents_moved / outcome.shares_filled) as u32) } else { None };

        Ok(MarketOrderResponse {
            shares_filled: outcome.shares_filled,
            cents_spent: outcome.cents_moved,
            average_price_cents,
            message: outcome.message,
        })
    }

    /// Transitions an OPEN/PARTIAL order owned by `req.user_id` to CANCELLED.
    pub async fn cancel(&self, market_id: Uuid, req: CancelOrderRequest) -> EngineResult<()> {
        let order = self
            .database
            .get_order(req.order_id)
            .await
            .map_err(EngineError::Internal)?
            .ok_or_else(|| EngineError::NotFound(format!("order {} not found", req.order_id)))?;

        if order.user_id != req.user_id {
            return Err(EngineError::Authorization(format!(
                "{} does not own order {}",
                req.user_id, req.order_id
            )));
        }
        if !matches!(order.status, OrderStatus::Open | OrderStatus::Partial) {
            return Err(EngineError::Precondition(format!(
                "order {} is {:?}, cannot cancel",
                req.order_id, order.status
            )));
        }

        let books_lock = self.books_for(market_id).await?;
        let mut books = books_lock.lock().await;

        let mut cancelled = books.book(order.outcome).remove_order(req.order_id).ok_or_else(|| {
            EngineError::Internal(anyhow!("order {} was indexed in storage but missing from the live book", req.order_id))
        })?;
        cancelled.status = OrderStatus::Cancelled;

        self.database.update_order(&cancelled).await.map_err(EngineError::Internal)?;
        self.sync_market(market_id, &books, 0).await?;
        self.publish_snapshot(market_id, &books).await;
        Ok(())
    }

    /// Resolves the market: winners are credited `winning_shares * $1`,
    /// every resting order is cancelled, and the market transitions to
    /// `resolved`.
    pub async fn resolve(&self, market_id: Uuid, req: ResolveMarketRequest) -> EngineResult<Market> {
        let mut market = self.require_active_market(market_id).await?;

        let books_lock = self.books_for(market_id).await?;
        let mut books = books_lock.lock().await;

        let positions = self
            .database
            .list_positions_for_market(market_id)
            .await
            .map_err(EngineError::Internal)?;
        for position in &positions {
            let winning_shares = match req.outcome {
                Outcome::Yes => position.yes_shares,
                Outcome::No => position.no_shares,
            };
            if winning_shares > 0 {
                self.ledger.credit(&position.user_id, winning_shares * 100);
            }
        }

        let open_orders = self
            .database
            .list_open_orders_for_market(market_id)
            .await
            .map_err(EngineError::Internal)?;
        for mut order in open_orders {
            books.book(order.outcome).remove_order(order.order_id);
            order.status = OrderStatus::Cancelled;
            self.database.update_order(&order).await.map_err(EngineError::Internal)?;
        }

        market.status = MarketStatus::Resolved;
        market.resolved_outcome = Some(req.outcome);
        market.resolved_at = Some(Utc::now());
        self.database.update_market(&market).await.map_err(EngineError::Internal)?;

        self.publish_snapshot(market_id, &books).await;
        Ok(market)
    }

    /// Refunds every position at cost basis and every resting BUY order at
    /// its quoted price, then deletes the market and all its dependent
    /// records. Resting SELL orders are not refunded: the shares behind
    /// them are deleted along with the position they came from, an
    /// asymmetry the design notes flag and keep as-specified.
    pub async fn delete(&self, market_id: Uuid) -> EngineResult<DeleteMarketResult> {
        self.get_market(market_id).await?;

        // hold the market's own critical section for the whole refund+delete
        // sequence, same as every other mutating operation, so a
        // submit/cancel/resolve already in flight finishes (and none starts)
        // before the storage rows it touches are torn down.
        let books_lock = self.books_for(market_id).await?;
        let _books = books_lock.lock().await;

        let positions = self
            .database
            .list_positions_for_market(market_id)
            .await
            .map_err(EngineError::Internal)?;
        let mut total_refunded_cents = 0u64;
        let mut positions_refunded = 0usize;
        for position in &positions {
            let refund = position.yes_shares * position.avg_yes_price_cents as u64
                + position.no_shares * position.avg_no_price_cents as u64;
            if refund > 0 {
                self.ledger.credit(&position.user_id, refund);
                total_refunded_cents += refund;
                positions_refunded += 1;
            }
        }

        let open_orders = self
            .database
            .list_open_orders_for_market(market_id)
            .await
            .map_err(EngineError::Internal)?;
        let mut orders_refunded = 0usize;
        for order in &open_orders {
            if order.side != OrderSide::Buy {
                continue;
            }
            let refund = order.remaining() * order.price_cents as u64;
            if refund > 0 {
                self.ledger.credit(&order.user_id, refund);
                total_refunded_cents += refund;
                orders_refunded += 1;
            }
        }

        self.database.delete_positions_for_market(market_id).await.map_err(EngineError::Internal)?;
        self.database.delete_orders_for_market(market_id).await.map_err(EngineError::Internal)?;
        self.database.delete_trades_for_market(market_id).await.map_err(EngineError::Internal)?;
        self.database.delete_market(market_id).await.map_err(EngineError::Internal)?;

        // drop the live books last, still inside the critical section, so no
        // later caller can re-hydrate a book for a market that no longer
        // exists in storage while this operation is still in flight.
        self.books.write().await.remove(&market_id);

        Ok(DeleteMarketResult { market_id, positions_refunded, orders_refunded, total_refunded_cents })
    }

    /// Current price-level aggregation for both outcome books.
    pub async fn snapshot(&self, market_id: Uuid) -> EngineResult<OrderbookSnapshot> {
        self.get_market(market_id).await?;
        let books_lock = self.books_for(market_id).await?;
        let books = books_lock.lock().await;
        Ok(OrderbookSnapshot {
            market_id,
            yes: books.yes.snapshot(50),
            no: books.no.snapshot(50),
            midpoint_yes_cents: books.yes.midpoint_cents(),
            midpoint_no_cents: books.no.midpoint_cents(),
            timestamp: Utc::now(),
        })
    }
}
