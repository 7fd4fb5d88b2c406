// Market-order execution: sweep the book immediately instead of resting.
//
// BUY market orders are budget-denominated (spend up to N cents); SELL
// market orders are quantity-denominated (sell up to N shares). When a BUY
// exhausts the book's liquidity with budget still unspent, it falls back to
// a synthetic mint attempt at `midpoint + 1 cent` (capped at 99) against
// the opposite outcome's resting BUY book — grounded in the original
// system's `execute_market_buy` fallback, which lets a market buyer create
// a complementary pair rather than leave cash on the table. SELL orders
// have no equivalent fallback: there is no burning primitive in this
// exchange, so an unmatched SELL remainder is simply left unfilled.

use chrono::Utc;
use uuid::Uuid;

use crate::ledger::TokenLedger;
use crate::matching::engine::OrderBook;
use crate::matching::minting::attempt_mint;
use crate::types::{Order, OrderSide, OrderStatus, Outcome, Trade};

pub struct MarketOrderOutcome {
    pub shares_filled: u64,
    /// Cents spent (BUY) or received (SELL).
    pub cents_moved: u64,
    pub trades: Vec<Trade>,
    /// Resting maker orders (and, for the BUY fallback-mint path, the
    /// synthetic order itself if it rested unfilled remainder — it never
    /// does, see below) touched by this sweep, for the caller to persist.
    pub touched_orders: Vec<Order>,
    pub message: String,
}

pub fn execute_market_buy(
    buyer_id: &str,
    market_id: Uuid,
    outcome: Outcome,
    budget_cents: u64,
    book: &mut OrderBook,
    opposite_book: &mut OrderBook,
    ledger: &dyn crate::ledger::TokenLedger,
) -> MarketOrderOutcome {
    let (mut shares_filled, mut cents_spent, mut trades, mut touched_orders) =
        book.sweep_asks_by_budget(buyer_id, market_id, budget_cents, ledger);
    let mut remaining_budget = budget_cents - cents_spent;

    if remaining_budget > 0 && shares_filled == 0 {
        let mint_price = (book.midpoint_cents() + 1).min(99);
        let mint_qty = remaining_budget / mint_price as u64;
        if mint_qty > 0 {
            let mut synthetic = Order {
                order_id: Uuid::new_v4(),
                market_id,
                user_id: buyer_id.to_string(),
                outcome,
                side: OrderSide::Buy,
                price_cents: mint_price,
                quantity: mint_qty,
                filled_quantity: 0,
                status: OrderStatus::Open,
                created_at: Utc::now(),
            };
            let (mut mint_trades, mut mint_touched) = attempt_mint(&mut synthetic, opposite_book, ledger);
            if synthetic.filled_quantity > 0 {
                let spent = synthetic.filled_quantity * mint_price as u64;
                shares_filled += synthetic.filled_quantity;
                cents_spent += spent;
                remaining_budget -= spent;
                trades.append(&mut mint_trades);
                touched_orders.append(&mut mint_touched);
            }
            // any unfilled remainder of the transient order is simply
            // discarded rather than rested: it never existed as a
            // standing order the owner could cancel.
        }
    }

    let message = if shares_filled == 0 {
        "no liquidity available to fill market order".to_string()
    } else if remaining_budget > 0 {
        format!("filled {shares_filled} shares, {remaining_budget} cents left unspent")
    } else {
        format!("filled {shares_filled} shares")
    };

    MarketOrderOutcome { shares_filled, cents_moved: cents_spent, trades, touched_orders, message }
}

pub fn execute_market_sell(
    seller_id: &str,
    market_id: Uuid,
    quantity: u64,
    book: &mut OrderBook,
    ledger: &dyn crate::ledger::TokenLedger,
) -> MarketOrderOutcome {
    let (shares_filled, cents_received, trades, touched_orders) =
        book.sweep_bids_by_quantity(seller_id, market_id, quantity, ledger);

    let message = if shares_filled == 0 {
        "no liquidity available to fill market order".to_string()
    } else if shares_filled < quantity {
        format!("filled {shares_filled} of {quantity} shares requested")
    } else {
        format!("filled {shares_filled} shares")
    };

    MarketOrderOutcome { shares_filled, cents_moved: cents_received, trades, touched_orders, message }
}
