// Core types for the binary prediction-market exchange

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// The two outcomes of a binary market.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    pub fn opposite(self) -> Outcome {
        match self {
            Outcome::Yes => Outcome::No,
            Outcome::No => Outcome::Yes,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    Open,
    Partial,
    Filled,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MarketStatus {
    Active,
    Resolved,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeKind {
    Match,
    Mint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub market_id: Uuid,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub status: MarketStatus,
    pub resolved_outcome: Option<Outcome>,
    pub current_yes_price_cents: u32,
    pub current_no_price_cents: u32,
    pub total_volume_cents: u64,
}

impl Market {
    pub fn new(title: String, description: String) -> Self {
        Self {
            market_id: Uuid::new_v4(),
            title,
            description,
            created_at: Utc::now(),
            resolved_at: None,
            status: MarketStatus::Active,
            resolved_outcome: None,
            // an untraded market opens at the coin-flip price on both sides
            current_yes_price_cents: 50,
            current_no_price_cents: 50,
            total_volume_cents: 0,
        }
    }
}

/// A resting or filled limit order. `price_cents` is always in `1..=99`:
/// 0 and 100 are excluded because a filled share is worth exactly $1 and a
/// worthless share is worth exactly $0, so orders at those prices carry no
/// counterparty risk and the exchange doesn't need a book for them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Uuid,
    pub market_id: Uuid,
    pub user_id: String,
    pub outcome: Outcome,
    pub side: OrderSide,
    pub price_cents: u32,
    pub quantity: u64,
    pub filled_quantity: u64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn remaining(&self) -> u64 {
        self.quantity - self.filled_quantity
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: Uuid,
    pub market_id: Uuid,
    pub outcome: Outcome,
    pub buy_order_id: Option<Uuid>,
    pub sell_order_id: Option<Uuid>,
    pub buyer_id: String,
    pub seller_id: String,
    pub price_cents: u32,
    pub quantity: u64,
    pub kind: TradeKind,
    pub executed_at: DateTime<Utc>,
}

/// Per-(user, market) share holdings with a weighted-average cost basis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub user_id: String,
    pub market_id: Uuid,
    pub yes_shares: u64,
    pub no_shares: u64,
    pub avg_yes_price_cents: u32,
    pub avg_no_price_cents: u32,
}

impl Position {
    pub fn empty(user_id: String, market_id: Uuid) -> Self {
        Self {
            user_id,
            market_id,
            yes_shares: 0,
            no_shares: 0,
            avg_yes_price_cents: 0,
            avg_no_price_cents: 0,
        }
    }

    /// Weighted-average cost after acquiring `qty` more shares at `price_cents`.
    pub fn apply_buy(&mut self, outcome: Outcome, qty: u64, price_cents: u32) {
        let (shares, avg) = match outcome {
            Outcome::Yes => (&mut self.yes_shares, &mut self.avg_yes_price_cents),
            Outcome::No => (&mut self.no_shares, &mut self.avg_no_price_cents),
        };
        let old_cost = (*shares as u64) * (*avg as u64);
        let new_cost = qty * price_cents as u64;
        let total_shares = *shares + qty;
        *avg = if total_shares == 0 {
            0
        } else {
            ((old_cost + new_cost) / total_shares) as u32
        };
        *shares = total_shares;
    }

    pub fn apply_sell(&mut self, outcome: Outcome, qty: u64) {
        match outcome {
            Outcome::Yes => self.yes_shares = self.yes_shares.saturating_sub(qty),
            Outcome::No => self.no_shares = self.no_shares.saturating_sub(qty),
        }
    }
}

// ================================
// ORDERBOOK VIEW TYPES
// ================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price_cents: u32,
    pub quantity: u64,
    pub order_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderbookSide {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderbookSnapshot {
    pub market_id: Uuid,
    pub yes: OrderbookSide,
    pub no: OrderbookSide,
    pub midpoint_yes_cents: u32,
    pub midpoint_no_cents: u32,
    pub timestamp: DateTime<Utc>,
}

// ================================
// API REQUEST/RESPONSE TYPES
// ================================

/// Market creation is an admin/out-of-core concern per spec; this crate
/// still ships a thin endpoint for it so the adapter is exercisable
/// end-to-end without a separate metadata service.
#[derive(Debug, Deserialize)]
pub struct CreateMarketRequest {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitLimitOrderRequest {
    pub market_id: Uuid,
    pub user_id: String,
    pub outcome: Outcome,
    pub side: OrderSide,
    pub price_cents: u32,
    pub quantity: u64,
}

#[derive(Debug, Serialize)]
pub struct TradeMatch {
    pub trade_id: Uuid,
    pub counterparty: String,
    pub price_cents: u32,
    pub quantity: u64,
    pub kind: TradeKind,
}

#[derive(Debug, Serialize)]
pub struct SubmitOrderResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub filled_quantity: u64,
    pub matches: Vec<TradeMatch>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitMarketOrderRequest {
    pub market_id: Uuid,
    pub user_id: String,
    pub outcome: Outcome,
    pub side: OrderSide,
    /// For BUY: total budget to spend, in cents. For SELL: shares to sell.
    pub amount: u64,
}

#[derive(Debug, Serialize)]
pub struct MarketOrderResponse {
    pub shares_filled: u64,
    pub cents_spent: u64,
    pub average_price_cents: Option<u32>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelOrderRequest {
    pub order_id: Uuid,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveMarketRequest {
    pub outcome: Outcome,
}

#[derive(Debug, Serialize)]
pub struct DeleteMarketResult {
    pub market_id: Uuid,
    pub positions_refunded: usize,
    pub orders_refunded: usize,
    pub total_refunded_cents: u64,
}

/// Reduced wire shape for `trade_executed` pushes — no order or user ids,
/// just what a subscriber watching the tape needs. `trade_type` is only
/// present for mints; a plain match carries no tag.
#[derive(Debug, Clone, Serialize)]
pub struct TradeExecutedEvent {
    pub market_id: Uuid,
    pub side: Outcome,
    pub price: u32,
    pub quantity: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_type: Option<&'static str>,
}

impl TradeExecutedEvent {
    pub fn from_trade(trade: &Trade) -> Self {
        Self {
            market_id: trade.market_id,
            side: trade.outcome,
            price: trade.price_cents,
            quantity: trade.quantity,
            timestamp: trade.executed_at,
            trade_type: match trade.kind {
                TradeKind::Mint => Some("MINT"),
                TradeKind::Match => None,
            },
        }
    }
}

// WebSocket push types
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum WebSocketMessage {
    OrderbookUpdate {
        market_id: Uuid,
        snapshot: OrderbookSnapshot,
    },
    TradeExecuted {
        #[serde(flatten)]
        event: TradeExecutedEvent,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum WebSocketCommand {
    Subscribe { market_id: Uuid },
    Unsubscribe { market_id: Uuid },
}
