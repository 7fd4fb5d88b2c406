// Database factory for switching between in-memory and PostgreSQL implementations.

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{Database, SimplePostgresDatabase};
use crate::types::{Market, Order, Position, Trade};

pub enum DatabaseType {
    InMemory,
    PostgreSQL,
}

/// Trait both storage backends satisfy. Covers the persisted layout of
/// spec §6: markets, orders, trades, positions.
#[async_trait::async_trait]
pub trait DatabaseTrait: Send + Sync {
    async fn insert_market(&self, market: &Market) -> Result<()>;
    async fn update_market(&self, market: &Market) -> Result<()>;
    async fn get_market(&self, market_id: Uuid) -> Result<Option<Market>>;
    async fn list_markets(&self) -> Result<Vec<Market>>;
    async fn delete_market(&self, market_id: Uuid) -> Result<()>;

    async fn insert_order(&self, order: &Order) -> Result<()>;
    async fn update_order(&self, order: &Order) -> Result<()>;
    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>>;
    async fn list_open_orders_for_market(&self, market_id: Uuid) -> Result<Vec<Order>>;
    async fn delete_orders_for_market(&self, market_id: Uuid) -> Result<()>;

    async fn insert_trade(&self, trade: &Trade) -> Result<()>;
    async fn list_trades_for_market(&self, market_id: Uuid) -> Result<Vec<Trade>>;
    async fn delete_trades_for_market(&self, market_id: Uuid) -> Result<()>;

    async fn get_position(&self, user_id: &str, market_id: Uuid) -> Result<Option<Position>>;
    async fn upsert_position(&self, position: &Position) -> Result<()>;
    async fn list_positions_for_market(&self, market_id: Uuid) -> Result<Vec<Position>>;
    async fn delete_positions_for_market(&self, market_id: Uuid) -> Result<()>;
}

#[async_trait::async_trait]
impl DatabaseTrait for Database {
    async fn insert_market(&self, market: &Market) -> Result<()> { self.insert_market(market).await }
    async fn update_market(&self, market: &Market) -> Result<()> { self.update_market(market).await }
    async fn get_market(&self, market_id: Uuid) -> Result<Option<Market>> { self.get_market(market_id).await }
    async fn list_markets(&self) -> Result<Vec<Market>> { self.list_markets().await }
    async fn delete_market(&self, market_id: Uuid) -> Result<()> { self.delete_market(market_id).await }

    async fn insert_order(&self, order: &Order) -> Result<()> { self.insert_order(order).await }
    async fn update_order(&self, order: &Order) -> Result<()> { self.update_order(order).await }
    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>> { self.get_order(order_id).await }
    async fn list_open_orders_for_market(&self, market_id: Uuid) -> Result<Vec<Order>> {
        self.list_open_orders_for_market(market_id).await
    }
    async fn delete_orders_for_market(&self, market_id: Uuid) -> Result<()> {
        self.delete_orders_for_market(market_id).await
    }

    async fn insert_trade(&self, trade: &Trade) -> Result<()> { self.insert_trade(trade).await }
    async fn list_trades_for_market(&self, market_id: Uuid) -> Result<Vec<Trade>> {
        self.list_trades_for_market(market_id).await
    }
    async fn delete_trades_for_market(&self, market_id: Uuid) -> Result<()> {
        self.delete_trades_for_market(market_id).await
    }

    async fn get_position(&self, user_id: &str, market_id: Uuid) -> Result<Option<Position>> {
        self.get_position(user_id, market_id).await
    }
    async fn upsert_position(&self, position: &Position) -> Result<()> { self.upsert_position(position).await }
    async fn list_positions_for_market(&self, market_id: Uuid) -> Result<Vec<Position>> {
        self.list_positions_for_market(market_id).await
    }
    async fn delete_positions_for_market(&self, market_id: Uuid) -> Result<()> {
        self.delete_positions_for_market(market_id).await
    }
}

#[async_trait::async_trait]
impl DatabaseTrait for SimplePostgresDatabase {
    async fn insert_market(&self, market: &Market) -> Result<()> { self.insert_market(market).await }
    async fn update_market(&self, market: &Market) -> Result<()> { self.update_market(market).await }
    async fn get_market(&self, market_id: Uuid) -> Result<Option<Market>> { self.get_market(market_id).await }
    async fn list_markets(&self) -> Result<Vec<Market>> { self.list_markets().await }
    async fn delete_market(&self, market_id: Uuid) -> Result<()> { self.delete_market(market_id).await }

    async fn insert_order(&self, order: &Order) -> Result<()> { self.insert_order(order).await }
    async fn update_order(&self, order: &Order) -> Result<()> { self.update_order(order).await }
    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>> { self.get_order(order_id).await }
    async fn list_open_orders_for_market(&self, market_id: Uuid) -> Result<Vec<Order>> {
        self.list_open_orders_for_market(market_id).await
    }
    async fn delete_orders_for_market(&self, market_id: Uuid) -> Result<()> {
        self.delete_orders_for_market(market_id).await
    }

    async fn insert_trade(&self, trade: &Trade) -> Result<()> { self.insert_trade(trade).await }
    async fn list_trades_for_market(&self, market_id: Uuid) -> Result<Vec<Trade>> {
        self.list_trades_for_market(market_id).await
    }
    async fn delete_trades_for_market(&self, market_id: Uuid) -> Result<()> {
        self.delete_trades_for_market(market_id).await
    }

    async fn get_position(&self, user_id: &str, market_id: Uuid) -> Result<Option<Position>> {
        self.get_position(user_id, market_id).await
    }
    async fn upsert_position(&self, position: &Position) -> Result<()> { self.upsert_position(position).await }
    async fn list_positions_for_market(&self, market_id: Uuid) -> Result<Vec<Position>> {
        self.list_positions_for_market(market_id).await
    }
    async fn delete_positions_for_market(&self, market_id: Uuid) -> Result<()> {
        self.delete_positions_for_market(market_id).await
    }
}

use tokio::sync::OnceCell;

static DATABASE_INSTANCE: OnceCell<Arc<dyn DatabaseTrait>> = OnceCell::const_new();

/// Process-wide singleton, used by `main`. Selects PostgreSQL when
/// `DATABASE_URL` is set, falling back to in-memory on connection failure.
pub async fn create_database() -> Result<Arc<dyn DatabaseTrait>> {
    let database = DATABASE_INSTANCE
        .get_or_try_init(|| async {
            let result: Result<Arc<dyn DatabaseTrait>> = match determine_database_type() {
                DatabaseType::PostgreSQL => {
                    info!("initializing PostgreSQL database connection");
                    match SimplePostgresDatabase::new().await {
                        Ok(postgres_db) => {
                            info!("connected to PostgreSQL");
                            Ok(Arc::new(postgres_db) as Arc<dyn DatabaseTrait>)
                        }
                        Err(e) => {
                            error!("PostgreSQL connection failed: {e}");
                            warn!("falling back to in-memory database");
                            Ok(Arc::new(Database::new().await?) as Arc<dyn DatabaseTrait>)
                        }
                    }
                }
                DatabaseType::InMemory => {
                    info!("using in-memory database");
                    Ok(Arc::new(Database::new().await?) as Arc<dyn DatabaseTrait>)
                }
            };
            result
        })
        .await?;

    Ok(database.clone())
}

/// Always a fresh instance — tests must not share state across runs.
pub async fn create_test_database() -> Result<Arc<dyn DatabaseTrait>> {
    let use_postgres = std::env::var("USE_POSTGRES_FOR_TESTS")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    if use_postgres {
        match SimplePostgresDatabase::new_test().await {
            Ok(postgres_db) => Ok(Arc::new(postgres_db)),
            Err(e) => {
                warn!("test PostgreSQL connection failed: {e}, using in-memory");
                Ok(Arc::new(Database::new_test().await?))
            }
        }
    } else {
        Ok(Arc::new(Database::new_test().await?))
    }
}

fn determine_database_type() -> DatabaseType {
    if std::env::var("DATABASE_URL").is_ok() {
        DatabaseType::PostgreSQL
    } else {
        DatabaseType::InMemory
    }
}
