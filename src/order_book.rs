//! Single-symbol order book with price-time priority.
//!
//! - Bids: descending by price (best = highest key).
//! - Asks: ascending by price (best = lowest key).
//! - FIFO within each price level; the per-order `ts` is the priority
//!   timestamp, reset only when a modify changes the price.
//!
//! Validation lives at the exchange; the book only reports unknown and
//! duplicate ids. A crossed book after the match loop is an internal
//! invariant violation and halts the run.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::messages::{AgentId, Side};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BookError {
    #[error("Unknown order id: {0}")]
    UnknownOrder(String),
    #[error("Duplicate order id: {0}")]
    DuplicateOrder(String),
}

/// A resident limit order. `ts` is assigned on insertion and reset iff a
/// modify changes the price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrder {
    pub id: String,
    pub agent: AgentId,
    pub symbol: String,
    pub side: Side,
    /// Price in cents.
    pub price: u64,
    /// Remaining quantity.
    pub qty: u64,
    /// Priority timestamp, nanoseconds.
    pub ts: u64,
}

/// One match between a resting order and an aggressor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub price: u64,
    pub qty: u64,
    pub maker: AgentId,
    pub taker: AgentId,
    pub maker_side: Side,
    pub maker_order_id: String,
    /// Absent for market-order takers.
    pub taker_order_id: Option<String>,
}

/// Result of a market-order sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketFill {
    pub filled: u64,
    pub executions: Vec<Execution>,
}

/// Aggregated L2 depth snapshot: `(price, total qty)` per level, best first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct L2Snapshot {
    pub bids: Vec<(u64, u64)>,
    pub asks: Vec<(u64, u64)>,
    pub last: Option<u64>,
}

pub struct OrderBook {
    symbol: String,
    bids: BTreeMap<u64, VecDeque<LimitOrder>>,
    asks: BTreeMap<u64, VecDeque<LimitOrder>>,
    /// Order id -> (side, price) for O(1) level lookup on cancel/modify.
    index: HashMap<String, (Side, u64)>,
    last: Option<u64>,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
            last: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn last(&self) -> Option<u64> {
        self.last
    }

    pub fn best_bid_price(&self) -> Option<u64> {
        self.bids.keys().next_back().copied()
    }

    pub fn best_ask_price(&self) -> Option<u64> {
        self.asks.keys().next().copied()
    }

    /// Insert a limit order on its side, then match while the book is
    /// crossed. Returns the executions generated, in match order.
    pub fn place_limit(&mut self, order: LimitOrder) -> Result<Vec<Execution>, BookError> {
        if self.index.contains_key(&order.id) {
            return Err(BookError::DuplicateOrder(order.id));
        }
        debug_assert!(order.price > 0 && order.qty > 0);

        self.index
            .insert(order.id.clone(), (order.side, order.price));
        self.side_levels_mut(order.side)
            .entry(order.price)
            .or_default()
            .push_back(order);

        Ok(self.run_match())
    }

    /// Sweep the opposite side at its best prices until `qty` is exhausted
    /// or that side is empty. Executions come out in the price-time order
    /// of the makers consumed.
    pub fn place_market(&mut self, agent: AgentId, side: Side, qty: u64) -> MarketFill {
        let mut remaining = qty;
        let mut executions = Vec::new();

        while remaining > 0 {
            let maker_side = side.opposite();
            let best = match maker_side {
                Side::Buy => self.best_bid_price(),
                Side::Sell => self.best_ask_price(),
            };
            let Some(price) = best else { break };

            let Some(top) = self
                .side_levels(maker_side)
                .get(&price)
                .and_then(|level| level.front())
            else {
                break;
            };
            let take = remaining.min(top.qty);
            executions.push(Execution {
                price,
                qty: take,
                maker: top.agent,
                taker: agent,
                maker_side,
                maker_order_id: top.id.clone(),
                taker_order_id: None,
            });

            self.last = Some(price);
            self.consume_top(maker_side, price, take);
            remaining -= take;
        }

        MarketFill {
            filled: qty - remaining,
            executions,
        }
    }

    /// Remove a resident order, returning it (former side/price/qty).
    pub fn cancel(&mut self, order_id: &str) -> Result<LimitOrder, BookError> {
        self.remove_order(order_id)
    }

    /// Mutate a resident order's price and/or quantity.
    ///
    /// - `qty` of 0 removes the order (cancel-equivalent).
    /// - A changed price resets `ts` to `now_ts` and requeues the order at
    ///   the back of its new level; the book is then re-matched, so a price
    ///   improvement may execute immediately.
    /// - An unchanged price preserves `ts` and queue position.
    ///
    /// Returns the mutated order as it stood after the mutation, plus any
    /// executions the re-match produced.
    pub fn modify(
        &mut self,
        order_id: &str,
        price: Option<u64>,
        qty: Option<u64>,
        now_ts: u64,
    ) -> Result<(LimitOrder, Vec<Execution>), BookError> {
        let (side, cur_price) = self
            .index
            .get(order_id)
            .copied()
            .ok_or_else(|| BookError::UnknownOrder(order_id.to_string()))?;

        if qty == Some(0) {
            let mut removed = self.remove_order(order_id)?;
            removed.qty = 0;
            return Ok((removed, Vec::new()));
        }

        let price_changed = price.is_some_and(|p| p != cur_price);
        if price_changed {
            let mut order = self.remove_order(order_id)?;
            order.price = price.unwrap_or(cur_price);
            order.ts = now_ts;
            if let Some(q) = qty {
                order.qty = q;
            }
            let mutated = order.clone();
            self.index
                .insert(order.id.clone(), (order.side, order.price));
            self.side_levels_mut(order.side)
                .entry(order.price)
                .or_default()
                .push_back(order);
            let executions = self.run_match();
            return Ok((mutated, executions));
        }

        // In-place quantity patch; ts and queue position survive.
        let level = self
            .side_levels_mut(side)
            .get_mut(&cur_price)
            .ok_or_else(|| BookError::UnknownOrder(order_id.to_string()))?;
        let order = level
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| BookError::UnknownOrder(order_id.to_string()))?;
        if let Some(q) = qty {
            order.qty = q;
        }
        Ok((order.clone(), Vec::new()))
    }

    /// Aggregated L2 levels per side, truncated to `depth`, plus `last`.
    pub fn snapshot(&self, depth: usize) -> L2Snapshot {
        let bids = self
            .bids
            .iter()
            .rev()
            .take(depth)
            .map(|(price, level)| (*price, level.iter().map(|o| o.qty).sum()))
            .collect();
        let asks = self
            .asks
            .iter()
            .take(depth)
            .map(|(price, level)| (*price, level.iter().map(|o| o.qty).sum()))
            .collect();
        L2Snapshot {
            bids,
            asks,
            last: self.last,
        }
    }

    /// All resident orders, best price first per side, optionally
    /// restricted to one agent.
    pub fn open_orders(&self, agent: Option<AgentId>) -> Vec<LimitOrder> {
        let matches = |o: &&LimitOrder| agent.map_or(true, |a| o.agent == a);
        let mut out: Vec<LimitOrder> = self
            .bids
            .iter()
            .rev()
            .flat_map(|(_, level)| level.iter())
            .filter(matches)
            .cloned()
            .collect();
        out.extend(
            self.asks
                .iter()
                .flat_map(|(_, level)| level.iter())
                .filter(matches)
                .cloned(),
        );
        out
    }

    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    fn side_levels(&self, side: Side) -> &BTreeMap<u64, VecDeque<LimitOrder>> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn side_levels_mut(&mut self, side: Side) -> &mut BTreeMap<u64, VecDeque<LimitOrder>> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Greedy match loop: while the book is crossed, trade the two tops at
    /// the timestamp-earlier order's price.
    fn run_match(&mut self) -> Vec<Execution> {
        let mut executions = Vec::new();

        loop {
            let (Some(bid_price), Some(ask_price)) =
                (self.best_bid_price(), self.best_ask_price())
            else {
                break;
            };
            if bid_price < ask_price {
                break;
            }

            let (Some(bid), Some(ask)) = (
                self.bids.get(&bid_price).and_then(|l| l.front()),
                self.asks.get(&ask_price).and_then(|l| l.front()),
            ) else {
                break;
            };

            // The resting (earlier-ts) order sets the price; ties go to the
            // bid.
            let bid_is_maker = bid.ts <= ask.ts;
            let price = if bid_is_maker { bid.price } else { ask.price };
            let qty = bid.qty.min(ask.qty);
            let (maker, taker) = if bid_is_maker {
                (bid, ask)
            } else {
                (ask, bid)
            };
            executions.push(Execution {
                price,
                qty,
                maker: maker.agent,
                taker: taker.agent,
                maker_side: maker.side,
                maker_order_id: maker.id.clone(),
                taker_order_id: Some(taker.id.clone()),
            });

            self.last = Some(price);
            self.consume_top(Side::Buy, bid_price, qty);
            self.consume_top(Side::Sell, ask_price, qty);
        }

        if let (Some(b), Some(a)) = (self.best_bid_price(), self.best_ask_price()) {
            assert!(
                b < a,
                "[OrderBook] crossed book after match: bid {b} >= ask {a}"
            );
        }
        executions
    }

    /// Decrement the top order of a level by `qty`, dropping it (and the
    /// level) when exhausted.
    fn consume_top(&mut self, side: Side, price: u64, qty: u64) {
        let levels = self.side_levels_mut(side);
        let Some(level) = levels.get_mut(&price) else {
            return;
        };
        let mut filled_id = None;
        if let Some(top) = level.front_mut() {
            top.qty = top.qty.saturating_sub(qty);
            if top.qty == 0 {
                filled_id = level.pop_front().map(|o| o.id);
            }
        }
        if level.is_empty() {
            levels.remove(&price);
        }
        if let Some(id) = filled_id {
            self.index.remove(&id);
        }
    }

    fn remove_order(&mut self, order_id: &str) -> Result<LimitOrder, BookError> {
        let (side, price) = self
            .index
            .remove(order_id)
            .ok_or_else(|| BookError::UnknownOrder(order_id.to_string()))?;
        let levels = self.side_levels_mut(side);
        let Some(level) = levels.get_mut(&price) else {
            return Err(BookError::UnknownOrder(order_id.to_string()));
        };
        let Some(pos) = level.iter().position(|o| o.id == order_id) else {
            return Err(BookError::UnknownOrder(order_id.to_string()));
        };
        let order = level.remove(pos).expect("position was just located");
        if level.is_empty() {
            levels.remove(&price);
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: &str, agent: AgentId, side: Side, price: u64, qty: u64, ts: u64) -> LimitOrder {
        LimitOrder {
            id: id.to_string(),
            agent,
            symbol: "ACME".to_string(),
            side,
            price,
            qty,
            ts,
        }
    }

    #[test]
    fn uncrossed_resting_book() {
        let mut book = OrderBook::new("ACME");
        let ex1 = book
            .place_limit(order("b1", 1, Side::Buy, 9900, 10, 1))
            .unwrap();
        let ex2 = book
            .place_limit(order("a1", 2, Side::Sell, 10100, 5, 2))
            .unwrap();
        assert!(ex1.is_empty());
        assert!(ex2.is_empty());

        let snap = book.snapshot(1);
        assert_eq!(snap.bids, vec![(9900, 10)]);
        assert_eq!(snap.asks, vec![(10100, 5)]);
        assert_eq!(snap.last, None);
    }

    #[test]
    fn cross_at_insertion_partial_fill() {
        let mut book = OrderBook::new("ACME");
        book.place_limit(order("b1", 1, Side::Buy, 9900, 10, 1))
            .unwrap();
        book.place_limit(order("a1", 2, Side::Sell, 10100, 5, 2))
            .unwrap();

        let execs = book
            .place_limit(order("b2", 3, Side::Buy, 10200, 3, 3))
            .unwrap();
        assert_eq!(execs.len(), 1);
        let e = &execs[0];
        assert_eq!(e.price, 10100);
        assert_eq!(e.qty, 3);
        assert_eq!(e.maker, 2);
        assert_eq!(e.taker, 3);
        assert_eq!(e.maker_side, Side::Sell);

        assert_eq!(book.last(), Some(10100));
        let snap = book.snapshot(5);
        assert_eq!(snap.asks, vec![(10100, 2)]);
        // b2 fully filled, not resident.
        assert!(book.open_orders(Some(3)).is_empty());
    }

    #[test]
    fn market_sweep_across_levels() {
        let mut book = OrderBook::new("ACME");
        book.place_limit(order("a1", 1, Side::Sell, 100, 2, 1))
            .unwrap();
        book.place_limit(order("a2", 2, Side::Sell, 101, 3, 2))
            .unwrap();

        let fill = book.place_market(9, Side::Buy, 4);
        assert_eq!(fill.filled, 4);
        assert_eq!(fill.executions.len(), 2);
        assert_eq!(
            (fill.executions[0].price, fill.executions[0].qty, fill.executions[0].maker),
            (100, 2, 1)
        );
        assert_eq!(
            (fill.executions[1].price, fill.executions[1].qty, fill.executions[1].maker),
            (101, 2, 2)
        );
        assert_eq!(book.last(), Some(101));
        assert_eq!(book.snapshot(5).asks, vec![(101, 1)]);
    }

    #[test]
    fn market_on_empty_side_fills_nothing() {
        let mut book = OrderBook::new("ACME");
        let fill = book.place_market(9, Side::Buy, 5);
        assert_eq!(fill.filled, 0);
        assert!(fill.executions.is_empty());
        assert_eq!(book.last(), None);
    }

    #[test]
    fn modify_preserves_ts_on_equal_price() {
        let mut book = OrderBook::new("ACME");
        book.place_limit(order("b1", 1, Side::Buy, 500, 10, 1))
            .unwrap();

        let (mutated, execs) = book.modify("b1", Some(500), Some(7), 9).unwrap();
        assert!(execs.is_empty());
        assert_eq!(mutated.ts, 1);
        assert_eq!(mutated.qty, 7);

        let (mutated, _) = book.modify("b1", Some(501), None, 9).unwrap();
        assert_eq!(mutated.ts, 9);
        assert_eq!(mutated.price, 501);
    }

    #[test]
    fn modify_price_change_loses_queue_position() {
        let mut book = OrderBook::new("ACME");
        book.place_limit(order("b1", 1, Side::Buy, 500, 5, 1))
            .unwrap();
        book.place_limit(order("b2", 2, Side::Buy, 501, 5, 2))
            .unwrap();

        // Move b2 down to b1's level; it queues behind b1.
        book.modify("b2", Some(500), None, 10).unwrap();
        let fill = book.place_market(9, Side::Sell, 5);
        assert_eq!(fill.executions[0].maker_order_id, "b1");
    }

    #[test]
    fn modify_to_zero_qty_is_cancel() {
        let mut book = OrderBook::new("ACME");
        book.place_limit(order("b1", 1, Side::Buy, 500, 10, 1))
            .unwrap();
        let (removed, _) = book.modify("b1", None, Some(0), 5).unwrap();
        assert_eq!(removed.qty, 0);
        assert_eq!(book.order_count(), 0);
        assert_eq!(
            book.cancel("b1"),
            Err(BookError::UnknownOrder("b1".to_string()))
        );
    }

    #[test]
    fn modify_price_improvement_rematches() {
        let mut book = OrderBook::new("ACME");
        book.place_limit(order("b1", 1, Side::Buy, 9900, 4, 1))
            .unwrap();
        book.place_limit(order("a1", 2, Side::Sell, 10000, 4, 2))
            .unwrap();

        let (_, execs) = book.modify("b1", Some(10000), None, 3).unwrap();
        assert_eq!(execs.len(), 1);
        // a1 rested first and sets the price.
        assert_eq!(execs[0].price, 10000);
        assert_eq!(execs[0].maker, 2);
        assert_eq!(book.order_count(), 0);
    }

    #[test]
    fn place_cancel_restores_book() {
        let mut book = OrderBook::new("ACME");
        book.place_limit(order("a1", 1, Side::Sell, 10100, 5, 1))
            .unwrap();
        let before = book.snapshot(10);

        book.place_limit(order("b1", 2, Side::Buy, 9900, 10, 2))
            .unwrap();
        let removed = book.cancel("b1").unwrap();
        assert_eq!((removed.side, removed.price, removed.qty), (Side::Buy, 9900, 10));
        assert_eq!(book.snapshot(10), before);
    }

    #[test]
    fn equal_quantities_remove_both_sides() {
        let mut book = OrderBook::new("ACME");
        book.place_limit(order("b1", 1, Side::Buy, 100, 5, 1))
            .unwrap();
        let execs = book
            .place_limit(order("a1", 2, Side::Sell, 100, 5, 2))
            .unwrap();
        assert_eq!(execs.len(), 1);
        assert_eq!(execs[0].price, 100);
        assert_eq!(book.order_count(), 0);
        assert!(book.snapshot(1).bids.is_empty());
        assert!(book.snapshot(1).asks.is_empty());
    }

    #[test]
    fn match_price_follows_earlier_timestamp() {
        // Ask rests first, later bid crosses: trade at the ask's price.
        let mut book = OrderBook::new("ACME");
        book.place_limit(order("a1", 1, Side::Sell, 100, 5, 1))
            .unwrap();
        let execs = book
            .place_limit(order("b1", 2, Side::Buy, 105, 5, 2))
            .unwrap();
        assert_eq!(execs[0].price, 100);

        // Bid rests first, later ask undercuts: trade at the bid's price.
        let mut book = OrderBook::new("ACME");
        book.place_limit(order("b1", 1, Side::Buy, 105, 5, 1))
            .unwrap();
        let execs = book
            .place_limit(order("a1", 2, Side::Sell, 100, 5, 2))
            .unwrap();
        assert_eq!(execs[0].price, 105);
        assert_eq!(execs[0].maker, 1);
        assert_eq!(execs[0].maker_side, Side::Buy);
    }

    #[test]
    fn sweep_consumes_fifo_within_level() {
        let mut book = OrderBook::new("ACME");
        book.place_limit(order("a1", 1, Side::Sell, 100, 2, 1))
            .unwrap();
        book.place_limit(order("a2", 2, Side::Sell, 100, 2, 2))
            .unwrap();

        let fill = book.place_market(9, Side::Buy, 3);
        assert_eq!(fill.executions[0].maker_order_id, "a1");
        assert_eq!(fill.executions[1].maker_order_id, "a2");
        assert_eq!(fill.executions[1].qty, 1);
        assert_eq!(book.snapshot(1).asks, vec![(100, 1)]);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut book = OrderBook::new("ACME");
        book.place_limit(order("b1", 1, Side::Buy, 100, 5, 1))
            .unwrap();
        let err = book
            .place_limit(order("b1", 1, Side::Buy, 101, 5, 2))
            .unwrap_err();
        assert_eq!(err, BookError::DuplicateOrder("b1".to_string()));
    }

    #[test]
    fn unknown_ids_error_on_cancel_and_modify() {
        let mut book = OrderBook::new("ACME");
        assert!(matches!(book.cancel("nope"), Err(BookError::UnknownOrder(_))));
        assert!(matches!(
            book.modify("nope", Some(1), None, 0),
            Err(BookError::UnknownOrder(_))
        ));
    }

    #[test]
    fn snapshot_aggregates_and_truncates() {
        let mut book = OrderBook::new("ACME");
        book.place_limit(order("b1", 1, Side::Buy, 100, 2, 1))
            .unwrap();
        book.place_limit(order("b2", 2, Side::Buy, 100, 3, 2))
            .unwrap();
        book.place_limit(order("b3", 3, Side::Buy, 99, 4, 3))
            .unwrap();
        book.place_limit(order("b4", 4, Side::Buy, 98, 1, 4))
            .unwrap();

        let snap = book.snapshot(2);
        assert_eq!(snap.bids, vec![(100, 5), (99, 4)]);

        // Snapshot is a pure read: repeated calls agree.
        assert_eq!(book.snapshot(2), snap);
    }

    #[test]
    fn open_orders_filters_by_agent() {
        let mut book = OrderBook::new("ACME");
        book.place_limit(order("b1", 1, Side::Buy, 100, 2, 1))
            .unwrap();
        book.place_limit(order("a1", 2, Side::Sell, 105, 3, 2))
            .unwrap();

        assert_eq!(book.open_orders(None).len(), 2);
        let mine = book.open_orders(Some(2));
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, "a1");
    }
}
