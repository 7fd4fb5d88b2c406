// Re-export main modules for the orderbook service library

use std::sync::Arc;

pub mod api;
pub mod errors;
pub mod ledger;
pub mod matching;
pub mod positions;
pub mod storage;
pub mod types;

pub use types::*;
use crate::ledger::TokenLedger;
use crate::matching::events::EventBus;
use crate::matching::MatchingEngine;
use crate::storage::DatabaseTrait;

#[derive(Clone)]
pub struct AppState {
    pub matching_engine: Arc<MatchingEngine>,
    pub database: Arc<dyn DatabaseTrait>,
    pub ledger: Arc<dyn TokenLedger>,
    pub events: Arc<EventBus>,
}
