// Database layer for persistent storage: markets, orders, trades, positions.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::types::{Market, Order, OrderStatus, Position, Trade};

pub mod simple_postgres;
pub use simple_postgres::SimplePostgresDatabase;

pub mod factory;
pub use factory::{create_database, create_test_database, DatabaseTrait};

/// In-memory implementation, the default when `DATABASE_URL` is unset and
/// the backing store for the crate's test suite.
pub struct Database {
    markets: RwLock<HashMap<Uuid, Market>>,
    orders: RwLock<HashMap<Uuid, Order>>,
    trades: RwLock<HashMap<Uuid, Trade>>,
    positions: RwLock<HashMap<(String, Uuid), Position>>,
}

impl Database {
    pub async fn new() -> Result<Self> {
        Ok(Self {
            markets: RwLock::new(HashMap::new()),
            orders: RwLock::new(HashMap::new()),
            trades: RwLock::new(HashMap::new()),
            positions: RwLock::new(HashMap::new()),
        })
    }

    pub async fn new_test() -> Result<Self> {
        Self::new().await
    }

    // ---- markets ----

    pub async fn insert_market(&self, market: &Market) -> Result<()> {
        let mut markets = self.markets.write().map_err(|e| anyhow!("markets lock poisoned: {e}"))?;
        markets.insert(market.market_id, market.clone());
        Ok(())
    }

    pub async fn update_market(&self, market: &Market) -> Result<()> {
        let mut markets = self.markets.write().map_err(|e| anyhow!("markets lock poisoned: {e}"))?;
        markets.insert(market.market_id, market.clone());
        Ok(())
    }

    pub async fn get_market(&self, market_id: Uuid) -> Result<Option<Market>> {
        let markets = self.markets.read().map_err(|e| anyhow!("markets lock poisoned: {e}"))?;
        Ok(markets.get(&market_id).cloned())
    }

    pub async fn list_markets(&self) -> Result<Vec<Market>> {
        let markets = self.markets.read().map_err(|e| anyhow!("markets lock poisoned: {e}"))?;
        Ok(markets.values().cloned().collect())
    }

    pub async fn delete_market(&self, market_id: Uuid) -> Result<()> {
        let mut markets = self.markets.write().map_err(|e| anyhow!("markets lock poisoned: {e}"))?;
        markets.remove(&market_id);
        Ok(())
    }

    // ---- orders ----

    pub async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().map_err(|e| anyhow!("orders lock poisoned: {e}"))?;
        orders.insert(order.order_id, order.clone());
        Ok(())
    }

    pub async fn update_order(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().map_err(|e| anyhow!("orders lock poisoned: {e}"))?;
        orders.insert(order.order_id, order.clone());
        Ok(())
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>> {
        let orders = self.orders.read().map_err(|e| anyhow!("orders lock poisoned: {e}"))?;
        Ok(orders.get(&order_id).cloned())
    }

    pub async fn list_open_orders_for_market(&self, market_id: Uuid) -> Result<Vec<Order>> {
        let orders = self.orders.read().map_err(|e| anyhow!("orders lock poisoned: {e}"))?;
        Ok(orders
            .values()
            .filter(|o| o.market_id == market_id && matches!(o.status, OrderStatus::Open | OrderStatus::Partial))
            .cloned()
            .collect())
    }

    pub async fn delete_orders_for_market(&self, market_id: Uuid) -> Result<()> {
        let mut orders = self.orders.write().map_err(|e| anyhow!("orders lock poisoned: {e}"))?;
        orders.retain(|_, o| o.market_id != market_id);
        Ok(())
    }

    // ---- trades ----

    pub async fn insert_trade(&self, trade: &Trade) -> Result<()> {
        let mut trades = self.trades.write().map_err(|e| anyhow!("trades lock poisoned: {e}"))?;
        trades.insert(trade.trade_id, trade.clone());
        Ok(())
    }

    pub async fn list_trades_for_market(&self, market_id: Uuid) -> Result<Vec<Trade>> {
        let trades = self.trades.read().map_err(|e| anyhow!("trades lock poisoned: {e}"))?;
        let mut result: Vec<Trade> = trades.values().filter(|t| t.market_id == market_id).cloned().collect();
        result.sort_by_key(|t| t.executed_at);
        Ok(result)
    }

    pub async fn delete_trades_for_market(&self, market_id: Uuid) -> Result<()> {
        let mut trades = self.trades.write().map_err(|e| anyhow!("trades lock poisoned: {e}"))?;
        trades.retain(|_, t| t.market_id != market_id);
        Ok(())
    }

    // ---- positions ----

    pub async fn get_position(&self, user_id: &str, market_id: Uuid) -> Result<Option<Position>> {
        let positions = self.positions.read().map_err(|e| anyhow!("positions lock poisoned: {e}"))?;
        Ok(positions.get(&(user_id.to_string(), market_id)).cloned())
    }

    pub async fn upsert_position(&self, position: &Position) -> Result<()> {
        let mut positions = self.positions.write().map_err(|e| anyhow!("positions lock poisoned: {e}"))?;
        positions.insert((position.user_id.clone(), position.market_id), position.clone());
        Ok(())
    }

    pub async fn list_positions_for_market(&self, market_id: Uuid) -> Result<Vec<Position>> {
        let positions = self.positions.read().map_err(|e| anyhow!("positions lock poisoned: {e}"))?;
        Ok(positions.values().filter(|p| p.market_id == market_id).cloned().collect())
    }

    pub async fn delete_positions_for_market(&self, market_id: Uuid) -> Result<()> {
        let mut positions = self.positions.write().map_err(|e| anyhow!("positions lock poisoned: {e}"))?;
        positions.retain(|_, p| p.market_id != market_id);
        Ok(())
    }
}
