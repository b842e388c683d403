//! Market maker: keeps a two-sided quote around the observed mid.
//!
//! Re-quotes only when the reference price has drifted by at least the
//! hysteresis threshold, using cancel+replace. Before a mid exists it quotes
//! around the oracle fundamental.

use tracing::{debug, info, warn};

use crate::agents::Agent;
use crate::messages::{
    AgentId, CancelOrderPayload, LimitOrderPayload, Message, MessagePayload, MessageType,
    OrderExecutedPayload, Side, SimulatorApi, TradeRole,
};

#[derive(Debug, Clone)]
pub struct MarketMakerConfig {
    pub name: String,
    pub symbol: String,
    /// Full quoted spread in cents.
    pub spread: u64,
    /// Quantity per quote.
    pub qty: u64,
    /// Minimum reference drift in cents before a resident quote is moved.
    pub hysteresis: u64,
    pub wake_interval_ms: u64,
}

impl Default for MarketMakerConfig {
    fn default() -> Self {
        Self {
            name: "MarketMaker".to_string(),
            symbol: "ACME".to_string(),
            spread: 40,
            qty: 10,
            hysteresis: 10,
            wake_interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone)]
struct Quote {
    id: String,
    price: u64,
    qty: u64,
}

pub struct MarketMakerAgent {
    id: AgentId,
    name: String,
    symbol: String,
    spread: u64,
    qty: u64,
    hysteresis: u64,
    wake_interval_ns: u64,

    mid: Option<u64>,
    fundamental: Option<u64>,
    bid: Option<Quote>,
    ask: Option<Quote>,
    next_order_seq: u64,

    orders_placed: u64,
    fills: u64,
}

impl MarketMakerAgent {
    pub fn new(id: AgentId, config: MarketMakerConfig) -> Self {
        Self {
            id,
            name: config.name,
            symbol: config.symbol,
            spread: config.spread,
            qty: config.qty,
            hysteresis: config.hysteresis,
            wake_interval_ns: config.wake_interval_ms * 1_000_000,
            mid: None,
            fundamental: None,
            bid: None,
            ask: None,
            next_order_seq: 0,
            orders_placed: 0,
            fills: 0,
        }
    }

    fn next_order_id(&mut self) -> String {
        self.next_order_seq += 1;
        format!("mm{}-{}", self.id, self.next_order_seq)
    }

    fn reference_price(&self) -> Option<u64> {
        self.mid.or(self.fundamental)
    }

    fn quote_side(&mut self, sim: &mut dyn SimulatorApi, side: Side, price: u64) {
        let id = self.next_order_id();
        let quote = Quote {
            id: id.clone(),
            price,
            qty: self.qty,
        };
        match side {
            Side::Buy => self.bid = Some(quote),
            Side::Sell => self.ask = Some(quote),
        }
        let exchange = sim.exchange_id();
        sim.send(
            self.id,
            exchange,
            MessageType::LimitOrder,
            MessagePayload::LimitOrder(LimitOrderPayload {
                id,
                symbol: self.symbol.clone(),
                side,
                price,
                qty: self.qty,
            }),
        );
        self.orders_placed += 1;
    }

    fn cancel_quote(&mut self, sim: &mut dyn SimulatorApi, side: Side) {
        let quote = match side {
            Side::Buy => self.bid.take(),
            Side::Sell => self.ask.take(),
        };
        if let Some(q) = quote {
            let exchange = sim.exchange_id();
            sim.send(
                self.id,
                exchange,
                MessageType::CancelOrder,
                MessagePayload::CancelOrder(CancelOrderPayload { id: q.id }),
            );
        }
    }

    fn refresh_quotes(&mut self, sim: &mut dyn SimulatorApi) {
        let Some(reference) = self.reference_price() else {
            return;
        };
        let half = (self.spread / 2).max(1);
        let desired_bid = reference.saturating_sub(half).max(1);
        let desired_ask = reference.saturating_add(half);

        let bid_stale = self
            .bid
            .as_ref()
            .map_or(true, |q| q.price.abs_diff(desired_bid) >= self.hysteresis);
        if bid_stale {
            self.cancel_quote(sim, Side::Buy);
            self.quote_side(sim, Side::Buy, desired_bid);
        }

        let ask_stale = self
            .ask
            .as_ref()
            .map_or(true, |q| q.price.abs_diff(desired_ask) >= self.hysteresis);
        if ask_stale {
            self.cancel_quote(sim, Side::Sell);
            self.quote_side(sim, Side::Sell, desired_ask);
        }
    }

    fn handle_executed(&mut self, p: &OrderExecutedPayload) {
        if p.role != TradeRole::Maker {
            return;
        }
        self.fills += 1;
        let quote = match p.side_for_recipient {
            Side::Buy => &mut self.bid,
            Side::Sell => &mut self.ask,
        };
        if let Some(q) = quote {
            if Some(&q.id) == p.order_id.as_ref() {
                q.qty = q.qty.saturating_sub(p.qty);
                if q.qty == 0 {
                    *quote = None;
                }
            }
        }
    }
}

impl Agent for MarketMakerAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn on_start(&mut self, sim: &mut dyn SimulatorApi) {
        info!(
            "[MM {}] starting: spread={} qty={} hysteresis={}",
            self.name, self.spread, self.qty, self.hysteresis
        );
        sim.wakeup(self.id, sim.now_ns() + self.wake_interval_ns);
    }

    fn on_wakeup(&mut self, sim: &mut dyn SimulatorApi, now_ns: u64) {
        self.refresh_quotes(sim);
        sim.wakeup(self.id, now_ns + self.wake_interval_ns);
    }

    fn on_message(&mut self, _sim: &mut dyn SimulatorApi, msg: &Message) {
        match (&msg.msg_type, &msg.payload) {
            (MessageType::MarketData, MessagePayload::MarketData(p)) => {
                if p.symbol == self.symbol {
                    self.mid = match (p.snapshot.bids.first(), p.snapshot.asks.first()) {
                        (Some((b, _)), Some((a, _))) => Some((b + a) / 2),
                        _ => p.snapshot.last.or(self.mid),
                    };
                }
            }
            (MessageType::OracleTick, MessagePayload::OracleTick(p)) => {
                if p.symbol == self.symbol {
                    self.fundamental = Some(p.fundamental);
                }
            }
            (MessageType::OrderExecuted, MessagePayload::OrderExecuted(p)) => {
                if p.symbol == self.symbol {
                    self.handle_executed(p);
                }
            }
            (MessageType::OrderRejected, MessagePayload::OrderRejected(p)) => {
                warn!("[MM {}] rejected: {}", self.name, p.reason);
            }
            (MessageType::OrderAccepted, _) | (MessageType::OrderCancelled, _) => {
                debug!("[MM {}] {:?}", self.name, msg.msg_type);
            }
            _ => {}
        }
    }

    fn on_stop(&mut self, _sim: &mut dyn SimulatorApi) {
        info!(
            "[MM {}] stopping: {} orders placed, {} fills",
            self.name, self.orders_placed, self.fills
        );
    }
}
