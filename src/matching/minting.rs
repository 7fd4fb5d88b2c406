// Share minting: a BUY on one outcome paired with a resting BUY on the
// opposite outcome whose price is the exact complement (p + (100 - p)).
// Together the two buyers' cash covers the full $1 payout of a settled
// market, so the exchange can mint one YES share and one NO share out of
// thin air rather than needing a seller on the other side of the trade.
//
// Grounded on the original system's `attempt_share_minting`: minting is
// tried before matching on every incoming BUY, and only an exact price
// complement qualifies — there is no partial-cent slippage to split.

use crate::ledger::TokenLedger;
use crate::matching::engine::OrderBook;
use crate::types::{Order, OrderSide, Trade};

/// Attempts to fill `incoming` (a BUY order) against `opposite`'s resting
/// BUY book at the complementary price. Mutates `incoming` and any matched
/// counterparty orders in place; returns the mint trades produced plus
/// every counterparty order touched, for the caller to persist. A no-op
/// for SELL orders or prices with no valid complement (a price of exactly
/// 0 or 100 never reaches here — `Order` prices are constrained to 1..=99).
pub fn attempt_mint(incoming: &mut Order, opposite: &mut OrderBook, ledger: &dyn TokenLedger) -> (Vec<Trade>, Vec<Order>) {
    if incoming.side != OrderSide::Buy {
        return (Vec::new(), Vec::new());
    }

    let target_price = match 100u32.checked_sub(incoming.price_cents) {
        Some(p) if (1..=99).contains(&p) => p,
        _ => return (Vec::new(), Vec::new()),
    };

    let mut trades = Vec::new();
    let mut touched = Vec::new();
    opposite.mint_against_bids(target_price, incoming, ledger, &mut trades, &mut touched);
    (trades, touched)
}
