// Single-outcome limit orderbook: price-level ladders with FIFO queues at
// each level. One `OrderBook` exists per (market, outcome) pair; the
// `MatchingEngine` facade in `mod.rs` owns a pair of these per market and
// serializes access to both under one lock.

use std::collections::BTreeMap;
use std::collections::HashMap;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::ledger::TokenLedger;
use crate::types::{Order, OrderSide, OrderStatus, Outcome, PriceLevel, OrderbookSide, Trade, TradeKind};

#[derive(Default)]
struct Level {
    orders: Vec<Order>,
}

impl Level {
    fn total_remaining(&self) -> u64 {
        self.orders.iter().map(|o| o.remaining()).sum()
    }
}

pub struct OrderBook {
    outcome: Outcome,
    // price_cents -> FIFO queue of resting BUY orders
    bids: BTreeMap<u32, Level>,
    // price_cents -> FIFO queue of resting SELL orders
    asks: BTreeMap<u32, Level>,
    // order_id -> (side, price) so cancel/lookup don't need a full scan
    index: HashMap<Uuid, (OrderSide, u32)>,
}

impl OrderBook {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    pub fn best_bid(&self) -> Option<u32> {
        self.bids.keys().next_back().copied()
    }

    pub fn best_ask(&self) -> Option<u32> {
        self.asks.keys().next().copied()
    }

    /// (bid+ask)/2 when both sides exist, the lone side's best price when
    /// only one exists, 50 cents (a coin flip) when the book is empty.
    pub fn midpoint_cents(&self) -> u32 {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => (b + a) / 2,
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => 50,
        }
    }

    fn rest(&mut self, order: Order) {
        let side = order.side;
        let book = match side {
            OrderSide::Buy => &mut self.bids,
            OrderSide::Sell => &mut self.asks,
        };
        self.index.insert(order.order_id, (side, order.price_cents));
        book.entry(order.price_cents).or_default().orders.push(order);
    }

    fn cleanup_level(book: &mut BTreeMap<u32, Level>, price: u32) {
        if book.get(&price).map(|l| l.orders.is_empty()).unwrap_or(false) {
            book.remove(&price);
        }
    }

    /// Matches `incoming` against the opposite side of the book at
    /// maker-improving prices, oldest order at each price level first.
    /// Any unfilled remainder is rested on the book. Returns the resulting
    /// order state, the trades produced, and every maker order touched
    /// (in its post-fill state, whether still resting or now filled) so the
    /// caller can persist it.
    pub fn match_limit_order(&mut self, mut incoming: Order, ledger: &dyn TokenLedger) -> (Order, Vec<Trade>, Vec<Order>) {
        let mut trades = Vec::new();
        let mut touched = Vec::new();

        match incoming.side {
            OrderSide::Buy => {
                while incoming.remaining() > 0 {
                    let ask_price = match self.asks.keys().next() {
                        Some(p) => *p,
                        None => break,
                    };
                    if ask_price > incoming.price_cents {
                        break;
                    }
                    self.drain_level_against(&mut incoming, ask_price, false, ledger, &mut trades, &mut touched);
                    Self::cleanup_level(&mut self.asks, ask_price);
                }
            }
            OrderSide::Sell => {
                while incoming.remaining() > 0 {
                    let bid_price = match self.bids.keys().next_back() {
                        Some(p) => *p,
                        None => break,
                    };
                    if bid_price < incoming.price_cents {
                        break;
                    }
                    self.drain_level_against(&mut incoming, bid_price, true, ledger, &mut trades, &mut touched);
                    Self::cleanup_level(&mut self.bids, bid_price);
                }
            }
        }

        incoming.status = if incoming.filled_quantity == 0 {
            OrderStatus::Open
        } else if incoming.remaining() == 0 {
            OrderStatus::Filled
        } else {
            OrderStatus::Partial
        };

        if incoming.remaining() > 0 {
            self.rest(incoming.clone());
        }

        (incoming, trades, touched)
    }

    /// Executes `incoming` against the resting maker queue at `price`
    /// (`bids` if `against_bids`, else `asks`), FIFO, until either side is
    /// exhausted. Whichever side is the buyer in this fill — the maker
    /// when `incoming` is selling into resting bids, `incoming` itself
    /// when it's buying into resting asks — has its ledger balance
    /// reconfirmed before the debit; a buyer who can no longer afford the
    /// fill is a transient skip: the maker stays resting, untouched, and
    /// matching moves on to the next order at this level.
    fn drain_level_against(
        &mut self,
        incoming: &mut Order,
        price: u32,
        against_bids: bool,
        ledger: &dyn TokenLedger,
        trades: &mut Vec<Trade>,
        touched: &mut Vec<Order>,
    ) {
        let book = if against_bids { &mut self.bids } else { &mut self.asks };
        let level = match book.get_mut(&price) {
            Some(l) => l,
            None => return,
        };

        let mut kept = Vec::with_capacity(level.orders.len());
        let mut filled_ids = Vec::new();

        for mut maker in level.orders.drain(..) {
            if incoming.remaining() == 0 {
                kept.push(maker);
                continue;
            }

            let buyer_afford_cap = if against_bids {
                ledger.balance(&maker.user_id) / price as u64
            } else {
                ledger.balance(&incoming.user_id) / price as u64
            };

            if buyer_afford_cap == 0 {
                debug!(order_id = %maker.order_id, "transient skip: buyer can no longer afford this price");
                kept.push(maker);
                continue;
            }

            let fill_qty = incoming.remaining().min(maker.remaining()).min(buyer_afford_cap);
            if fill_qty == 0 {
                kept.push(maker);
                continue;
            }

            let cost = fill_qty * price as u64;
            let (buyer_id, seller_id, buy_order_id, sell_order_id) = if against_bids {
                ledger.debit(&maker.user_id, cost).expect("balance checked above");
                ledger.credit(&incoming.user_id, cost);
                (maker.user_id.clone(), incoming.user_id.clone(), Some(maker.order_id), Some(incoming.order_id))
            } else {
                ledger.debit(&incoming.user_id, cost).expect("balance checked above");
                ledger.credit(&maker.user_id, cost);
                (incoming.user_id.clone(), maker.user_id.clone(), Some(incoming.order_id), Some(maker.order_id))
            };

            maker.filled_quantity += fill_qty;
            incoming.filled_quantity += fill_qty;
            maker.status = if maker.remaining() == 0 { OrderStatus::Filled } else { OrderStatus::Partial };
            touched.push(maker.clone());

            trades.push(Trade {
                trade_id: Uuid::new_v4(),
                market_id: incoming.market_id,
                outcome: self.outcome,
                buy_order_id,
                sell_order_id,
                buyer_id,
                seller_id,
                price_cents: price,
                quantity: fill_qty,
                kind: TradeKind::Match,
                executed_at: Utc::now(),
            });

            if maker.remaining() == 0 {
                filled_ids.push(maker.order_id);
            } else {
                kept.push(maker);
            }
        }

        level.orders = kept;
        for id in filled_ids {
            self.index.remove(&id);
        }
    }

    /// Removes a resting order from the book, e.g. for cancellation.
    /// Returns the order as it stood at cancellation if it was found.
    pub fn remove_order(&mut self, order_id: Uuid) -> Option<Order> {
        let (side, price) = self.index.remove(&order_id)?;
        let book = match side {
            OrderSide::Buy => &mut self.bids,
            OrderSide::Sell => &mut self.asks,
        };
        let level = book.get_mut(&price)?;
        let pos = level.orders.iter().position(|o| o.order_id == order_id)?;
        let order = level.orders.remove(pos);
        Self::cleanup_level(book, price);
        Some(order)
    }

    pub fn get_order(&self, order_id: Uuid) -> Option<&Order> {
        let (side, price) = self.index.get(&order_id)?;
        let book = match side {
            OrderSide::Buy => &self.bids,
            OrderSide::Sell => &self.asks,
        };
        book.get(price)?.orders.iter().find(|o| o.order_id == order_id)
    }

    /// All orders currently resting in this book, both sides.
    pub fn all_orders(&self) -> impl Iterator<Item = &Order> {
        self.bids.values().chain(self.asks.values()).flat_map(|l| l.orders.iter())
    }

    /// Best `limit` levels: bids highest-first, asks lowest-first, matching
    /// the order a trading UI expects to render a depth ladder in.
    pub fn snapshot(&self, limit: usize) -> OrderbookSide {
        let bids = self
            .bids
            .iter()
            .rev()
            .take(limit)
            .map(|(price, level)| PriceLevel {
                price_cents: *price,
                quantity: level.total_remaining(),
                order_count: level.orders.len() as u32,
            })
            .collect();

        let asks = self
            .asks
            .iter()
            .take(limit)
            .map(|(price, level)| PriceLevel {
                price_cents: *price,
                quantity: level.total_remaining(),
                order_count: level.orders.len() as u32,
            })
            .collect();

        OrderbookSide { bids, asks }
    }

    pub fn rest_order(&mut self, order: Order) {
        self.rest(order);
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Mints against resting BUY orders at exactly `price` (the complement
    /// of `incoming`'s price) FIFO, until `incoming` is filled or the level
    /// is exhausted. Both `incoming` and the counterparty pay their own
    /// side's price in full — no seller leg, since minting manufactures
    /// the shares rather than transferring them. Either side's balance
    /// can have moved since it was last validated, so both are
    /// reconfirmed here; a shortfall on either leg is a transient skip,
    /// same as in direct matching. Recorded as a single Trade row tagged
    /// `Mint`, with both order refs pointing at the two BUY orders.
    pub fn mint_against_bids(
        &mut self,
        price: u32,
        incoming: &mut Order,
        ledger: &dyn TokenLedger,
        trades: &mut Vec<Trade>,
        touched: &mut Vec<Order>,
    ) {
        let level = match self.bids.get_mut(&price) {
            Some(l) => l,
            None => return,
        };

        let mut kept = Vec::with_capacity(level.orders.len());
        let mut filled_ids = Vec::new();

        for mut counterparty in level.orders.drain(..) {
            if incoming.remaining() == 0 {
                kept.push(counterparty);
                continue;
            }

            let counterparty_afford = ledger.balance(&counterparty.user_id) / price as u64;
            let incoming_afford = ledger.balance(&incoming.user_id) / incoming.price_cents as u64;
            if counterparty_afford == 0 || incoming_afford == 0 {
                debug!(order_id = %counterparty.order_id, "transient skip: mint party can no longer afford its leg");
                kept.push(counterparty);
                continue;
            }

            let fill_qty = incoming.remaining().min(counterparty.remaining()).min(counterparty_afford).min(incoming_afford);
            if fill_qty == 0 {
                kept.push(counterparty);
                continue;
            }

            ledger.debit(&incoming.user_id, fill_qty * incoming.price_cents as u64).expect("balance checked above");
            ledger.debit(&counterparty.user_id, fill_qty * price as u64).expect("balance checked above");

            counterparty.filled_quantity += fill_qty;
            incoming.filled_quantity += fill_qty;
            counterparty.status = if counterparty.remaining() == 0 { OrderStatus::Filled } else { OrderStatus::Partial };
            touched.push(counterparty.clone());

            trades.push(Trade {
                trade_id: Uuid::new_v4(),
                market_id: incoming.market_id,
                outcome: incoming.outcome,
                buy_order_id: Some(incoming.order_id),
                sell_order_id: Some(counterparty.order_id),
                buyer_id: incoming.user_id.clone(),
                seller_id: counterparty.user_id.clone(),
                price_cents: incoming.price_cents,
                quantity: fill_qty,
                kind: TradeKind::Mint,
                executed_at: Utc::now(),
            });

            if counterparty.remaining() == 0 {
                filled_ids.push(counterparty.order_id);
            } else {
                kept.push(counterparty);
            }
        }

        level.orders = kept;
        for id in filled_ids {
            self.index.remove(&id);
        }
    }

    /// Market-buy sweep: spends up to `budget_cents` across ask levels,
    /// cheapest first, taking as many whole shares as the remaining budget
    /// affords at each level. Never rests a remainder — an unspent budget
    /// with no matching liquidity is the caller's problem (minting
    /// fallback or leaving cash unspent).
    pub fn sweep_asks_by_budget(
        &mut self,
        buyer_id: &str,
        market_id: Uuid,
        budget_cents: u64,
        ledger: &dyn TokenLedger,
    ) -> (u64, u64, Vec<Trade>, Vec<Order>) {
        let mut remaining_budget = budget_cents;
        let mut qty_filled = 0u64;
        let mut cents_spent = 0u64;
        let mut trades = Vec::new();
        let mut touched = Vec::new();

        loop {
            let ask_price = match self.asks.keys().next() {
                Some(p) => *p,
                None => break,
            };
            if remaining_budget < ask_price as u64 {
                break;
            }
            let (level_qty, level_spent, mut level_trades, mut level_touched) =
                self.drain_level_by_budget(ask_price, buyer_id, market_id, remaining_budget, ledger);
            Self::cleanup_level(&mut self.asks, ask_price);
            if level_qty == 0 {
                break;
            }
            qty_filled += level_qty;
            cents_spent += level_spent;
            remaining_budget -= level_spent;
            trades.append(&mut level_trades);
            touched.append(&mut level_touched);
        }

        (qty_filled, cents_spent, trades, touched)
    }

    fn drain_level_by_budget(
        &mut self,
        price: u32,
        buyer_id: &str,
        market_id: Uuid,
        budget_cents: u64,
        ledger: &dyn TokenLedger,
    ) -> (u64, u64, Vec<Trade>, Vec<Order>) {
        let mut qty_filled = 0u64;
        let mut cents_spent = 0u64;
        let mut budget = budget_cents;
        let mut trades = Vec::new();
        let mut touched = Vec::new();

        let level = match self.asks.get_mut(&price) {
            Some(l) => l,
            None => return (0, 0, trades, touched),
        };

        loop {
            if budget < price as u64 {
                break;
            }
            let affordable = budget / price as u64;
            if affordable == 0 {
                break;
            }
            let maker = match level.orders.first_mut() {
                Some(m) => m,
                None => break,
            };
            let fill_qty = affordable.min(maker.remaining());
            if fill_qty == 0 {
                break;
            }
            maker.filled_quantity += fill_qty;
            maker.status = if maker.remaining() == 0 { OrderStatus::Filled } else { OrderStatus::Partial };
            let seller_id = maker.user_id.clone();
            let maker_id = maker.order_id;
            let maker_exhausted = maker.remaining() == 0;
            touched.push(maker.clone());

            qty_filled += fill_qty;
            let cost = fill_qty * price as u64;
            cents_spent += cost;
            budget -= cost;

            ledger.debit(buyer_id, cost).expect("market order budget pre-validated at submission");
            ledger.credit(&seller_id, cost);

            trades.push(Trade {
                trade_id: Uuid::new_v4(),
                market_id,
                outcome: self.outcome,
                buy_order_id: None,
                sell_order_id: Some(maker_id),
                buyer_id: buyer_id.to_string(),
                seller_id,
                price_cents: price,
                quantity: fill_qty,
                kind: TradeKind::Match,
                executed_at: Utc::now(),
            });

            if maker_exhausted {
                level.orders.remove(0);
                self.index.remove(&maker_id);
            } else {
                // the level's only remaining affordability was spent on a partial fill
                break;
            }
        }

        (qty_filled, cents_spent, trades, touched)
    }

    /// Market-sell sweep: sells up to `quantity` shares across bid levels,
    /// richest first. A resting buyer who can no longer afford their fill
    /// is a transient skip, same as the limit-order path. Never rests a
    /// remainder.
    pub fn sweep_bids_by_quantity(
        &mut self,
        seller_id: &str,
        market_id: Uuid,
        quantity: u64,
        ledger: &dyn TokenLedger,
    ) -> (u64, u64, Vec<Trade>, Vec<Order>) {
        let mut remaining_qty = quantity;
        let mut cents_received = 0u64;
        let mut trades = Vec::new();
        let mut touched = Vec::new();

        loop {
            if remaining_qty == 0 {
                break;
            }
            let bid_price = match self.bids.keys().next_back() {
                Some(p) => *p,
                None => break,
            };
            let (level_qty, level_received, mut level_trades, mut level_touched) =
                self.drain_level_by_quantity(bid_price, seller_id, market_id, remaining_qty, ledger);
            Self::cleanup_level(&mut self.bids, bid_price);
            if level_qty == 0 {
                // every remaining order at this price was an unaffordable transient skip
                break;
            }
            remaining_qty -= level_qty;
            cents_received += level_received;
            trades.append(&mut level_trades);
            touched.append(&mut level_touched);
        }

        (quantity - remaining_qty, cents_received, trades, touched)
    }

    fn drain_level_by_quantity(
        &mut self,
        price: u32,
        seller_id: &str,
        market_id: Uuid,
        quantity: u64,
        ledger: &dyn TokenLedger,
    ) -> (u64, u64, Vec<Trade>, Vec<Order>) {
        let mut qty_filled = 0u64;
        let mut cents_received = 0u64;
        let mut trades = Vec::new();
        let mut touched = Vec::new();
        let mut remaining = quantity;

        let level = match self.bids.get_mut(&price) {
            Some(l) => l,
            None => return (0, 0, trades, touched),
        };

        let mut kept = Vec::with_capacity(level.orders.len());
        let mut filled_ids = Vec::new();

        for mut maker in level.orders.drain(..) {
            if remaining == 0 {
                kept.push(maker);
                continue;
            }

            let affordable = ledger.balance(&maker.user_id) / price as u64;
            if affordable == 0 {
                debug!(order_id = %maker.order_id, "transient skip: resting buy can no longer afford this price");
                kept.push(maker);
                continue;
            }

            let fill_qty = remaining.min(maker.remaining()).min(affordable);
            if fill_qty == 0 {
                kept.push(maker);
                continue;
            }

            let cost = fill_qty * price as u64;
            ledger.debit(&maker.user_id, cost).expect("balance checked above");
            ledger.credit(seller_id, cost);

            maker.filled_quantity += fill_qty;
            maker.status = if maker.remaining() == 0 { OrderStatus::Filled } else { OrderStatus::Partial };
            let buyer_id = maker.user_id.clone();
            let maker_id = maker.order_id;
            touched.push(maker.clone());

            qty_filled += fill_qty;
            remaining -= fill_qty;
            cents_received += cost;

            trades.push(Trade {
                trade_id: Uuid::new_v4(),
                market_id,
                outcome: self.outcome,
                buy_order_id: Some(maker_id),
                sell_order_id: None,
                buyer_id,
                seller_id: seller_id.to_string(),
                price_cents: price,
                quantity: fill_qty,
                kind: TradeKind::Match,
                executed_at: Utc::now(),
            });

            if maker.remaining() == 0 {
                filled_ids.push(maker_id);
            } else {
                kept.push(maker);
            }
        }

        level.orders = kept;
        for id in filled_ids {
            self.index.remove(&id);
        }

        (qty_filled, cents_received, trades, touched)
    }
}
