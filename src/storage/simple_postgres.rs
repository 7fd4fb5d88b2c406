// PostgreSQL-backed storage, runtime-checked queries (no `sqlx::query!` macros,
// so the crate builds without a live database at compile time). Drop-in
// replacement for the in-memory `Database`, same `DatabaseTrait` surface.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::types::{Market, MarketStatus, Order, OrderSide, OrderStatus, Outcome, Position, Trade, TradeKind};

pub struct SimplePostgresDatabase {
    pool: PgPool,
}

impl SimplePostgresDatabase {
    pub async fn new() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").map_err(|_| anyhow!("DATABASE_URL not set"))?;

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .idle_timeout(std::time::Duration::from_secs(300))
            .max_lifetime(std::time::Duration::from_secs(1800))
            .connect(&database_url)
            .await
            .map_err(|e| anyhow!("failed to connect to database: {e}"))?;

        sqlx::query("SELECT 1").fetch_one(&pool).await.map_err(|e| anyhow!("connection test failed: {e}"))?;

        info!("connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub async fn new_test() -> Result<Self> {
        Self::new().await
    }

    // ---- encoding helpers ----

    fn outcome_str(o: Outcome) -> &'static str {
        match o {
            Outcome::Yes => "YES",
            Outcome::No => "NO",
        }
    }

    fn outcome_from_str(s: &str) -> Outcome {
        match s {
            "YES" => Outcome::Yes,
            _ => Outcome::No,
        }
    }

    fn side_str(s: OrderSide) -> &'static str {
        match s {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    fn side_from_str(s: &str) -> OrderSide {
        match s {
            "BUY" => OrderSide::Buy,
            _ => OrderSide::Sell,
        }
    }

    fn status_str(s: OrderStatus) -> &'static str {
        match s {
            OrderStatus::Open => "OPEN",
            OrderStatus::Partial => "PARTIAL",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    fn status_from_str(s: &str) -> OrderStatus {
        match s {
            "OPEN" => OrderStatus::Open,
            "PARTIAL" => OrderStatus::Partial,
            "FILLED" => OrderStatus::Filled,
            _ => OrderStatus::Cancelled,
        }
    }

    fn market_status_str(s: MarketStatus) -> &'static str {
        match s {
            MarketStatus::Active => "ACTIVE",
            MarketStatus::Resolved => "RESOLVED",
        }
    }

    fn market_status_from_str(s: &str) -> MarketStatus {
        match s {
            "RESOLVED" => MarketStatus::Resolved,
            _ => MarketStatus::Active,
        }
    }

    fn kind_str(k: TradeKind) -> &'static str {
        match k {
            TradeKind::Match => "MATCH",
            TradeKind::Mint => "MINT",
        }
    }

    fn kind_from_str(s: &str) -> TradeKind {
        match s {
            "MINT" => TradeKind::Mint,
            _ => TradeKind::Match,
        }
    }

    fn row_to_market(row: &sqlx::postgres::PgRow) -> Result<Market> {
        let resolved_outcome: Option<String> = row.try_get("resolved_outcome")?;
        Ok(Market {
            market_id: row.try_get("market_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
            resolved_at: row.try_get::<Option<DateTime<Utc>>, _>("resolved_at")?,
            status: Self::market_status_from_str(&row.try_get::<String, _>("status")?),
            resolved_outcome: resolved_outcome.map(|s| Self::outcome_from_str(&s)),
            current_yes_price_cents: row.try_get::<i32, _>("current_yes_price_cents")? as u32,
            current_no_price_cents: row.try_get::<i32, _>("current_no_price_cents")? as u32,
            total_volume_cents: row.try_get::<i64, _>("total_volume_cents")? as u64,
        })
    }

    fn row_to_order(row: &sqlx::postgres::PgRow) -> Result<Order> {
        Ok(Order {
            order_id: row.try_get("order_id")?,
            market_id: row.try_get("market_id")?,
            user_id: row.try_get("user_id")?,
            outcome: Self::outcome_from_str(&row.try_get::<String, _>("outcome")?),
            side: Self::side_from_str(&row.try_get::<String, _>("side")?),
            price_cents: row.try_get::<i32, _>("price_cents")? as u32,
            quantity: row.try_get::<i64, _>("quantity")? as u64,
            filled_quantity: row.try_get::<i64, _>("filled_quantity")? as u64,
            status: Self::status_from_str(&row.try_get::<String, _>("status")?),
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_trade(row: &sqlx::postgres::PgRow) -> Result<Trade> {
        Ok(Trade {
            trade_id: row.try_get("trade_id")?,
            market_id: row.try_get("market_id")?,
            outcome: Self::outcome_from_str(&row.try_get::<String, _>("outcome")?),
            buy_order_id: row.try_get("buy_order_id")?,
            sell_order_id: row.try_get("sell_order_id")?,
            buyer_id: row.try_get("buyer_id")?,
            seller_id: row.try_get("seller_id")?,
            price_cents: row.try_get::<i32, _>("price_cents")? as u32,
            quantity: row.try_get::<i64, _>("quantity")? as u64,
            kind: Self::kind_from_str(&row.try_get::<String, _>("kind")?),
            executed_at: row.try_get("executed_at")?,
        })
    }

    fn row_to_position(row: &sqlx::postgres::PgRow) -> Result<Position> {
        Ok(Position {
            user_id: row.try_get("user_id")?,
            market_id: row.try_get("market_id")?,
            yes_shares: row.try_get::<i64, _>("yes_shares")? as u64,
            no_shares: row.try_get::<i64, _>("no_shares")? as u64,
            avg_yes_price_cents: row.try_get::<i32, _>("avg_yes_price_cents")? as u32,
            avg_no_price_cents: row.try_get::<i32, _>("avg_no_price_cents")? as u32,
        })
    }

    // ---- markets ----

    pub async fn insert_market(&self, market: &Market) -> Result<()> {
        sqlx::query(
            "INSERT INTO markets (market_id, title, description, created_at, resolved_at, status, \
             resolved_outcome, current_yes_price_cents, current_no_price_cents, total_volume_cents) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(market.market_id)
        .bind(&market.title)
        .bind(&market.description)
        .bind(market.created_at)
        .bind(market.resolved_at)
        .bind(Self::market_status_str(market.status))
        .bind(market.resolved_outcome.map(Self::outcome_str))
        .bind(market.current_yes_price_cents as i32)
        .bind(market.current_no_price_cents as i32)
        .bind(market.total_volume_cents as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_market(&self, market: &Market) -> Result<()> {
        sqlx::query(
            "UPDATE markets SET status = $1, resolved_at = $2, resolved_outcome = $3, \
             current_yes_price_cents = $4, current_no_price_cents = $5, total_volume_cents = $6 \
             WHERE market_id = $7",
        )
        .bind(Self::market_status_str(market.status))
        .bind(market.resolved_at)
        .bind(market.resolved_outcome.map(Self::outcome_str))
        .bind(market.current_yes_price_cents as i32)
        .bind(market.current_no_price_cents as i32)
        .bind(market.total_volume_cents as i64)
        .bind(market.market_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_market(&self, market_id: Uuid) -> Result<Option<Market>> {
        let row = sqlx::query("SELECT * FROM markets WHERE market_id = $1")
            .bind(market_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_market).transpose()
    }

    pub async fn list_markets(&self) -> Result<Vec<Market>> {
        let rows = sqlx::query("SELECT * FROM markets").fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_market).collect()
    }

    pub async fn delete_market(&self, market_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM markets WHERE market_id = $1").bind(market_id).execute(&self.pool).await?;
        Ok(())
    }

    // ---- orders ----

    pub async fn insert_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            "INSERT INTO orders (order_id, market_id, user_id, outcome, side, price_cents, quantity, \
             filled_quantity, status, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(order.order_id)
        .bind(order.market_id)
        .bind(&order.user_id)
        .bind(Self::outcome_str(order.outcome))
        .bind(Self::side_str(order.side))
        .bind(order.price_cents as i32)
        .bind(order.quantity as i64)
        .bind(order.filled_quantity as i64)
        .bind(Self::status_str(order.status))
        .bind(order.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_order(&self, order: &Order) -> Result<()> {
        let result = sqlx::query("UPDATE orders SET filled_quantity = $1, status = $2 WHERE order_id = $3")
            .bind(order.filled_quantity as i64)
            .bind(Self::status_str(order.status))
            .bind(order.order_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("order {} not found for update", order.order_id));
        }
        Ok(())
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_order).transpose()
    }

    pub async fn list_open_orders_for_market(&self, market_id: Uuid) -> Result<Vec<Order>> {
        let rows = sqlx::query("SELECT * FROM orders WHERE market_id = $1 AND status IN ('OPEN', 'PARTIAL')")
            .bind(market_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_order).collect()
    }

    pub async fn delete_orders_for_market(&self, market_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM orders WHERE market_id = $1").bind(market_id).execute(&self.pool).await?;
        Ok(())
    }

    // ---- trades ----

    pub async fn insert_trade(&self, trade: &Trade) -> Result<()> {
        sqlx::query(
            "INSERT INTO trades (trade_id, market_id, outcome, buy_order_id, sell_order_id, buyer_id, \
             seller_id, price_cents, quantity, kind, executed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(trade.trade_id)
        .bind(trade.market_id)
        .bind(Self::outcome_str(trade.outcome))
        .bind(trade.buy_order_id)
        .bind(trade.sell_order_id)
        .bind(&trade.buyer_id)
        .bind(&trade.seller_id)
        .bind(trade.price_cents as i32)
        .bind(trade.quantity as i64)
        .bind(Self::kind_str(trade.kind))
        .bind(trade.executed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_trades_for_market(&self, market_id: Uuid) -> Result<Vec<Trade>> {
        let rows = sqlx::query("SELECT * FROM trades WHERE market_id = $1 ORDER BY executed_at ASC")
            .bind(market_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_trade).collect()
    }

    pub async fn delete_trades_for_market(&self, market_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM trades WHERE market_id = $1").bind(market_id).execute(&self.pool).await?;
        Ok(())
    }

    // ---- positions ----

    pub async fn get_position(&self, user_id: &str, market_id: Uuid) -> Result<Option<Position>> {
        let row = sqlx::query("SELECT * FROM positions WHERE user_id = $1 AND market_id = $2")
            .bind(user_id)
            .bind(market_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_position).transpose()
    }

    pub async fn upsert_position(&self, position: &Position) -> Result<()> {
        sqlx::query(
            "INSERT INTO positions (user_id, market_id, yes_shares, no_shares, avg_yes_price_cents, \
             avg_no_price_cents) VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id, market_id) DO UPDATE SET \
             yes_shares = EXCLUDED.yes_shares, no_shares = EXCLUDED.no_shares, \
             avg_yes_price_cents = EXCLUDED.avg_yes_price_cents, \
             avg_no_price_cents = EXCLUDED.avg_no_price_cents",
        )
        .bind(&position.user_id)
        .bind(position.market_id)
        .bind(position.yes_shares as i64)
        .bind(position.no_shares as i64)
        .bind(position.avg_yes_price_cents as i32)
        .bind(position.avg_no_price_cents as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_positions_for_market(&self, market_id: Uuid) -> Result<Vec<Position>> {
        let rows = sqlx::query("SELECT * FROM positions WHERE market_id = $1").bind(market_id).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_position).collect()
    }

    pub async fn delete_positions_for_market(&self, market_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM positions WHERE market_id = $1").bind(market_id).execute(&self.pool).await?;
        Ok(())
    }
}
