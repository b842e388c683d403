//! Momentum trader: follows short-term trend in the published mid.
//!
//! Keeps a rolling mid-price history from MARKET_DATA, enters with a market
//! order when the fast average crosses the slow one, and exits on the
//! reverse cross.

use std::collections::VecDeque;

use tracing::{debug, info};

use crate::agents::Agent;
use crate::messages::{
    AgentId, MarketOrderPayload, Message, MessagePayload, MessageType, Side, SimulatorApi,
    TradeRole,
};

const MAX_PRICE_HISTORY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone)]
pub struct MomentumTraderConfig {
    pub name: String,
    pub symbol: String,
    pub fast_window: usize,
    pub slow_window: usize,
    pub qty: u64,
    pub wake_interval_ms: u64,
}

impl Default for MomentumTraderConfig {
    fn default() -> Self {
        Self {
            name: "Momentum".to_string(),
            symbol: "ACME".to_string(),
            fast_window: 5,
            slow_window: 20,
            qty: 3,
            wake_interval_ms: 1_000,
        }
    }
}

pub struct MomentumTraderAgent {
    id: AgentId,
    name: String,
    symbol: String,
    fast_window: usize,
    slow_window: usize,
    qty: u64,
    wake_interval_ns: u64,

    prices: VecDeque<u64>,
    /// Signed inventory: positive long, negative short.
    position: i64,
    last_signal: Signal,
    entries: u64,
    exits: u64,
}

impl MomentumTraderAgent {
    pub fn new(id: AgentId, config: MomentumTraderConfig) -> Self {
        Self {
            id,
            name: config.name,
            symbol: config.symbol,
            fast_window: config.fast_window,
            slow_window: config.slow_window,
            qty: config.qty,
            wake_interval_ns: config.wake_interval_ms * 1_000_000,
            prices: VecDeque::with_capacity(MAX_PRICE_HISTORY),
            position: 0,
            last_signal: Signal::Flat,
            entries: 0,
            exits: 0,
        }
    }

    fn record_price(&mut self, price: u64) {
        if self.prices.len() == MAX_PRICE_HISTORY {
            self.prices.pop_front();
        }
        self.prices.push_back(price);
    }

    fn sma(&self, window: usize) -> Option<f64> {
        if self.prices.len() < window {
            return None;
        }
        let sum: u64 = self.prices.iter().rev().take(window).sum();
        Some(sum as f64 / window as f64)
    }

    fn signal(&self) -> Signal {
        match (self.sma(self.fast_window), self.sma(self.slow_window)) {
            (Some(fast), Some(slow)) if fast > slow => Signal::Up,
            (Some(fast), Some(slow)) if fast < slow => Signal::Down,
            _ => Signal::Flat,
        }
    }

    fn send_market(&mut self, sim: &mut dyn SimulatorApi, side: Side, qty: u64) {
        let exchange = sim.exchange_id();
        sim.send(
            self.id,
            exchange,
            MessageType::MarketOrder,
            MessagePayload::MarketOrder(MarketOrderPayload { side, qty }),
        );
    }

    fn act_on_signal(&mut self, sim: &mut dyn SimulatorApi) {
        let signal = self.signal();
        if signal == self.last_signal || signal == Signal::Flat {
            return;
        }
        self.last_signal = signal;

        match signal {
            Signal::Up => {
                // Cover any short, then go long.
                let qty = self.qty + (-self.position).max(0) as u64;
                debug!("[Momentum {}] trend up, buying {}", self.name, qty);
                self.send_market(sim, Side::Buy, qty);
                self.entries += 1;
            }
            Signal::Down => {
                let qty = self.qty + self.position.max(0) as u64;
                debug!("[Momentum {}] trend down, selling {}", self.name, qty);
                self.send_market(sim, Side::Sell, qty);
                self.exits += 1;
            }
            Signal::Flat => {}
        }
    }
}

impl Agent for MomentumTraderAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn on_start(&mut self, sim: &mut dyn SimulatorApi) {
        sim.wakeup(self.id, sim.now_ns() + self.wake_interval_ns);
    }

    fn on_wakeup(&mut self, sim: &mut dyn SimulatorApi, now_ns: u64) {
        self.act_on_signal(sim);
        sim.wakeup(self.id, now_ns + self.wake_interval_ns);
    }

    fn on_message(&mut self, _sim: &mut dyn SimulatorApi, msg: &Message) {
        match (&msg.msg_type, &msg.payload) {
            (MessageType::MarketData, MessagePayload::MarketData(p)) => {
                if p.symbol == self.symbol {
                    if let (Some((b, _)), Some((a, _))) =
                        (p.snapshot.bids.first(), p.snapshot.asks.first())
                    {
                        self.record_price((b + a) / 2);
                    } else if let Some(last) = p.snapshot.last {
                        self.record_price(last);
                    }
                }
            }
            (MessageType::OrderExecuted, MessagePayload::OrderExecuted(p)) => {
                if p.symbol == self.symbol && p.role == TradeRole::Taker {
                    match p.side_for_recipient {
                        Side::Buy => self.position += p.qty as i64,
                        Side::Sell => self.position -= p.qty as i64,
                    }
                }
            }
            _ => {}
        }
    }

    fn on_stop(&mut self, _sim: &mut dyn SimulatorApi) {
        info!(
            "[Momentum {}] stopping: {} entries, {} exits, position={}",
            self.name, self.entries, self.exits, self.position
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_tracks_crossover() {
        let mut t = MomentumTraderAgent::new(
            7,
            MomentumTraderConfig {
                fast_window: 2,
                slow_window: 4,
                ..MomentumTraderConfig::default()
            },
        );
        for p in [100, 100, 100, 100] {
            t.record_price(p);
        }
        assert_eq!(t.signal(), Signal::Flat);

        for p in [110, 120] {
            t.record_price(p);
        }
        assert_eq!(t.signal(), Signal::Up);

        for p in [90, 80] {
            t.record_price(p);
        }
        assert_eq!(t.signal(), Signal::Down);
    }
}
