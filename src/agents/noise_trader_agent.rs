//! Noise trader: uninformed random flow.
//!
//! On each wake it flips a coin for the side, chooses limit or market, and
//! prices limits at a random offset from the reference. Resident orders
//! older than the TTL are swept with explicit cancels. All randomness comes
//! from a per-agent seeded PRNG.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::agents::Agent;
use crate::messages::{
    AgentId, CancelOrderPayload, LimitOrderPayload, MarketOrderPayload, Message, MessagePayload,
    MessageType, Side, SimulatorApi,
};

#[derive(Debug, Clone)]
pub struct NoiseTraderConfig {
    pub name: String,
    pub symbol: String,
    /// Probability of sending a market order instead of a limit.
    pub market_order_prob: f64,
    /// Maximum limit-price offset from the reference, in cents.
    pub max_offset: u64,
    pub max_qty: u64,
    /// Cancel own resident orders older than this.
    pub order_ttl_ms: u64,
    pub wake_interval_ms: u64,
    pub seed: u64,
}

impl Default for NoiseTraderConfig {
    fn default() -> Self {
        Self {
            name: "Noise".to_string(),
            symbol: "ACME".to_string(),
            market_order_prob: 0.25,
            max_offset: 50,
            max_qty: 5,
            order_ttl_ms: 10_000,
            wake_interval_ms: 700,
            seed: 42,
        }
    }
}

pub struct NoiseTraderAgent {
    id: AgentId,
    name: String,
    symbol: String,
    market_order_prob: f64,
    max_offset: u64,
    max_qty: u64,
    order_ttl_ns: u64,
    wake_interval_ns: u64,
    rng: StdRng,

    reference: Option<u64>,
    /// Own resident orders: id -> (placement time, remaining qty). Ordered
    /// map so the TTL sweep emits cancels in a reproducible order.
    open_orders: BTreeMap<String, (u64, u64)>,
    next_order_seq: u64,
    orders_sent: u64,
}

impl NoiseTraderAgent {
    pub fn new(id: AgentId, config: NoiseTraderConfig) -> Self {
        Self {
            id,
            name: config.name,
            symbol: config.symbol,
            market_order_prob: config.market_order_prob,
            max_offset: config.max_offset,
            max_qty: config.max_qty,
            order_ttl_ns: config.order_ttl_ms * 1_000_000,
            wake_interval_ns: config.wake_interval_ms * 1_000_000,
            rng: StdRng::seed_from_u64(config.seed),
            reference: None,
            open_orders: BTreeMap::new(),
            next_order_seq: 0,
            orders_sent: 0,
        }
    }

    fn next_order_id(&mut self) -> String {
        self.next_order_seq += 1;
        format!("nt{}-{}", self.id, self.next_order_seq)
    }

    fn sweep_stale_orders(&mut self, sim: &mut dyn SimulatorApi, now_ns: u64) {
        let stale: Vec<String> = self
            .open_orders
            .iter()
            .filter(|(_, (placed, _))| now_ns.saturating_sub(*placed) >= self.order_ttl_ns)
            .map(|(id, _)| id.clone())
            .collect();
        let exchange = sim.exchange_id();
        for id in stale {
            self.open_orders.remove(&id);
            sim.send(
                self.id,
                exchange,
                MessageType::CancelOrder,
                MessagePayload::CancelOrder(CancelOrderPayload { id }),
            );
        }
    }

    fn trade_once(&mut self, sim: &mut dyn SimulatorApi, now_ns: u64) {
        let Some(reference) = self.reference else {
            return;
        };
        let side = if self.rng.gen_bool(0.5) {
            Side::Buy
        } else {
            Side::Sell
        };
        let qty = self.rng.gen_range(1..=self.max_qty);
        let exchange = sim.exchange_id();

        if self.rng.gen_bool(self.market_order_prob) {
            sim.send(
                self.id,
                exchange,
                MessageType::MarketOrder,
                MessagePayload::MarketOrder(MarketOrderPayload { side, qty }),
            );
        } else {
            let offset = self.rng.gen_range(0..=self.max_offset);
            let price = match side {
                Side::Buy => reference.saturating_sub(offset).max(1),
                Side::Sell => reference.saturating_add(offset),
            };
            let id = self.next_order_id();
            self.open_orders.insert(id.clone(), (now_ns, qty));
            sim.send(
                self.id,
                exchange,
                MessageType::LimitOrder,
                MessagePayload::LimitOrder(LimitOrderPayload {
                    id,
                    symbol: self.symbol.clone(),
                    side,
                    price,
                    qty,
                }),
            );
        }
        self.orders_sent += 1;
    }
}

impl Agent for NoiseTraderAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn on_start(&mut self, sim: &mut dyn SimulatorApi) {
        // Stagger first wakes so a fleet of noise traders does not fire in
        // lockstep.
        let jitter = self.rng.gen_range(0..=self.wake_interval_ns);
        sim.wakeup(self.id, sim.now_ns() + self.wake_interval_ns + jitter);
    }

    fn on_wakeup(&mut self, sim: &mut dyn SimulatorApi, now_ns: u64) {
        self.sweep_stale_orders(sim, now_ns);
        self.trade_once(sim, now_ns);
        let jitter = self.rng.gen_range(0..=self.wake_interval_ns / 2);
        sim.wakeup(self.id, now_ns + self.wake_interval_ns + jitter);
    }

    fn on_message(&mut self, _sim: &mut dyn SimulatorApi, msg: &Message) {
        match (&msg.msg_type, &msg.payload) {
            (MessageType::MarketData, MessagePayload::MarketData(p)) => {
                if p.symbol == self.symbol {
                    self.reference = match (p.snapshot.bids.first(), p.snapshot.asks.first()) {
                        (Some((b, _)), Some((a, _))) => Some((b + a) / 2),
                        _ => p.snapshot.last.or(self.reference),
                    };
                }
            }
            (MessageType::OracleTick, MessagePayload::OracleTick(p)) => {
                if p.symbol == self.symbol && self.reference.is_none() {
                    self.reference = Some(p.fundamental);
                }
            }
            (MessageType::OrderCancelled, MessagePayload::OrderCancelled(p)) => {
                self.open_orders.remove(&p.order_id);
            }
            (MessageType::OrderExecuted, MessagePayload::OrderExecuted(p)) => {
                if let Some(id) = &p.order_id {
                    if let Some((_, remaining)) = self.open_orders.get_mut(id) {
                        *remaining = remaining.saturating_sub(p.qty);
                        if *remaining == 0 {
                            self.open_orders.remove(id);
                        }
                    }
                }
                debug!("[Noise {}] fill {} @ {}", self.name, p.qty, p.price);
            }
            (MessageType::OrderRejected, MessagePayload::OrderRejected(p)) => {
                if let MessagePayload::LimitOrder(o) = p.reference.as_ref() {
                    self.open_orders.remove(&o.id);
                }
            }
            _ => {}
        }
    }

    fn on_stop(&mut self, _sim: &mut dyn SimulatorApi) {
        info!(
            "[Noise {}] stopping: {} orders sent, {} still open",
            self.name,
            self.orders_sent,
            self.open_orders.len()
        );
    }
}
