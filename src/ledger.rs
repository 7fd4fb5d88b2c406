// Token balance ledger.
//
// Per the design note carried from the original system: a BUY order's
// funds are never reserved up front. The taker's own order is validated
// against their current balance at submission time (so a buyer can't place
// an order they can't possibly afford), but resting orders hold no lock on
// anyone's cash. That means a resting BUY maker's balance can have moved
// by the time it's finally matched — if so, the match attempt against that
// maker is skipped (`TransientSkip` in the error taxonomy: logged, not
// surfaced, matching moves on to the next candidate) rather than failing
// the taker's order.
//
// Kept as a small synchronous trait, not `DatabaseTrait`'s async
// interface, so the matching engine's otherwise-pure price-time loop can
// call it inline without threading async through every level of book
// traversal.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::{EngineError, EngineResult};

pub trait TokenLedger: Send + Sync {
    fn balance(&self, user_id: &str) -> u64;
    fn credit(&self, user_id: &str, cents: u64);
    fn debit(&self, user_id: &str, cents: u64) -> EngineResult<()>;
}

pub struct InMemoryTokenLedger {
    balances: Mutex<HashMap<String, u64>>,
    starting_balance_cents: u64,
}

impl InMemoryTokenLedger {
    pub fn new(starting_balance_cents: u64) -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            starting_balance_cents,
        }
    }
}

impl TokenLedger for InMemoryTokenLedger {
    fn balance(&self, user_id: &str) -> u64 {
        let balances = self.balances.lock().expect("token ledger mutex poisoned");
        *balances.get(user_id).unwrap_or(&self.starting_balance_cents)
    }

    fn credit(&self, user_id: &str, cents: u64) {
        let mut balances = self.balances.lock().expect("token ledger mutex poisoned");
        let entry = balances.entry(user_id.to_string()).or_insert(self.starting_balance_cents);
        *entry += cents;
    }

    fn debit(&self, user_id: &str, cents: u64) -> EngineResult<()> {
        let mut balances = self.balances.lock().expect("token ledger mutex poisoned");
        let entry = balances.entry(user_id.to_string()).or_insert(self.starting_balance_cents);
        if *entry < cents {
            return Err(EngineError::Precondition(format!(
                "{user_id} has insufficient balance for a {cents}-cent debit"
            )));
        }
        *entry -= cents;
        Ok(())
    }
}
