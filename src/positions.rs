// Position service: per-(user, market) share holdings with a
// weighted-average cost basis, applied after every fill.
//
// Grounded on the original system's `update_position` (weighted-average
// formula) — the teacher repo has no share-position concept of its own
// (it tracks USDC collateral, not outcome-token holdings), so this module
// is new code written in the teacher's plain-struct-over-a-DatabaseTrait
// style (`collateral::CollateralManager`).

use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

use crate::storage::DatabaseTrait;
use crate::types::{Outcome, Position, Trade, TradeKind};

pub struct PositionService {
    db: Arc<dyn DatabaseTrait>,
}

impl PositionService {
    pub fn new(db: Arc<dyn DatabaseTrait>) -> Self {
        Self { db }
    }

    pub async fn get_or_create(&self, user_id: &str, market_id: Uuid) -> Result<Position> {
        match self.db.get_position(user_id, market_id).await? {
            Some(p) => Ok(p),
            None => Ok(Position::empty(user_id.to_string(), market_id)),
        }
    }

    /// Applies a fill to the relevant side's position: the buyer's shares
    /// grow at a weighted-average cost, the seller's shrink at no cost-basis
    /// change (realized P&L is out of scope for this exchange).
    pub async fn apply_fill(
        &self,
        market_id: Uuid,
        outcome: Outcome,
        buyer_id: &str,
        seller_id: Option<&str>,
        price_cents: u32,
        quantity: u64,
    ) -> Result<()> {
        let mut buyer_position = self.get_or_create(buyer_id, market_id).await?;
        buyer_position.apply_buy(outcome, quantity, price_cents);
        self.db.upsert_position(&buyer_position).await?;

        if let Some(seller_id) = seller_id {
            let mut seller_position = self.get_or_create(seller_id, market_id).await?;
            seller_position.apply_sell(outcome, quantity);
            self.db.upsert_position(&seller_position).await?;
        }

        Ok(())
    }

    /// Folds every trade produced by one engine operation into the
    /// relevant positions. A mint trade carries both legs on one row:
    /// `buyer_id` takes `outcome` at `price_cents`, and `seller_id` — a
    /// second buyer, not a seller — takes the opposite outcome at its
    /// complementary price. Neither leg debits a seller position, since
    /// the shares come from nowhere, backed by both buyers' cash.
    pub async fn apply_trades(&self, trades: &[Trade]) -> Result<()> {
        for trade in trades {
            match trade.kind {
                TradeKind::Match => {
                    self.apply_fill(
                        trade.market_id,
                        trade.outcome,
                        &trade.buyer_id,
                        Some(trade.seller_id.as_str()),
                        trade.price_cents,
                        trade.quantity,
                    )
                    .await?;
                }
                TradeKind::Mint => {
                    self.apply_fill(trade.market_id, trade.outcome, &trade.buyer_id, None, trade.price_cents, trade.quantity)
                        .await?;
                    self.apply_fill(
                        trade.market_id,
                        trade.outcome.opposite(),
                        &trade.seller_id,
                        None,
                        100 - trade.price_cents,
                        trade.quantity,
                    )
                    .await?;
                }
            }
        }
        Ok(())
    }
}
