//! The exchange: the only agent permitted to mutate the order book.
//!
//! Receives order messages, validates them, drives the book, and produces
//! the response protocol: ACCEPTED / EXECUTED / CANCELLED / REJECTED back to
//! participants, TRADE and MARKET_DATA onto the event bus, and a depth
//! snapshot broadcast after every book mutation.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agents::Agent;
use crate::events::SimEvent;
use crate::messages::{
    AgentId, CancelOrderPayload, LimitOrderPayload, MarketDataPayload, MarketOrderPayload,
    Message, MessagePayload, MessageType, ModifyOrderPayload, OrderAcceptedPayload,
    OrderCancelledPayload, OrderExecutedPayload, OrderRejectedPayload, SimulatorApi, TradeRole,
};
use crate::order_book::{Execution, L2Snapshot, LimitOrder, OrderBook};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Depth of the market-data snapshots broadcast after mutations.
    #[serde(default = "default_md_depth")]
    pub md_depth: usize,
    /// Publish market data only when the snapshot changed since the last
    /// publication.
    #[serde(default)]
    pub publish_on_net_change_only: bool,
    /// Extra delay applied to every exchange outbound send, milliseconds.
    #[serde(default)]
    pub pipeline_delay_ms: u64,
}

fn default_symbol() -> String {
    "ACME".to_string()
}

fn default_md_depth() -> usize {
    10
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            md_depth: default_md_depth(),
            publish_on_net_change_only: false,
            pipeline_delay_ms: 0,
        }
    }
}

pub struct ExchangeAgent {
    id: AgentId,
    name: String,
    symbol: String,
    book: Arc<Mutex<OrderBook>>,
    md_depth: usize,
    publish_on_net_change_only: bool,
    pipeline_delay_ns: u64,
    last_published: Option<L2Snapshot>,
    trades: u64,
    rejects: u64,
}

impl ExchangeAgent {
    pub fn new(id: AgentId, name: String, config: ExchangeConfig) -> Self {
        let book = Arc::new(Mutex::new(OrderBook::new(config.symbol.clone())));
        Self {
            id,
            name,
            symbol: config.symbol,
            book,
            md_depth: config.md_depth,
            publish_on_net_change_only: config.publish_on_net_change_only,
            pipeline_delay_ns: config.pipeline_delay_ms * 1_000_000,
            last_published: None,
            trades: 0,
            rejects: 0,
        }
    }

    /// Shared handle to the book, for kernel registration and external
    /// snapshot readers. All mutation still happens inside this agent.
    pub fn book_handle(&self) -> Arc<Mutex<OrderBook>> {
        self.book.clone()
    }

    fn book(&self) -> MutexGuard<'_, OrderBook> {
        self.book.lock().expect("book mutex poisoned")
    }

    fn reply(&self, sim: &mut dyn SimulatorApi, to: AgentId, kind: MessageType, payload: MessagePayload) {
        sim.send_delayed(self.id, to, kind, payload, self.pipeline_delay_ns);
    }

    fn reject(
        &mut self,
        sim: &mut dyn SimulatorApi,
        to: AgentId,
        reason: &str,
        ref_type: MessageType,
        reference: MessagePayload,
    ) {
        self.rejects += 1;
        sim.emit_event(SimEvent::OrderRejected {
            ts: sim.now_ns(),
            agent: to,
            reason: reason.to_string(),
            ref_type,
        });
        self.reply(
            sim,
            to,
            MessageType::OrderRejected,
            MessagePayload::OrderRejected(OrderRejectedPayload {
                reason: reason.to_string(),
                ref_type,
                reference: Box::new(reference),
            }),
        );
    }

    /// Send one EXECUTED to each side of every match, with the TRADE bus
    /// event emitted between the two sends.
    fn dispatch_executions(&mut self, sim: &mut dyn SimulatorApi, executions: &[Execution]) {
        for e in executions {
            self.reply(
                sim,
                e.maker,
                MessageType::OrderExecuted,
                MessagePayload::OrderExecuted(OrderExecutedPayload {
                    symbol: self.symbol.clone(),
                    price: e.price,
                    qty: e.qty,
                    role: TradeRole::Maker,
                    side_for_recipient: e.maker_side,
                    order_id: Some(e.maker_order_id.clone()),
                }),
            );
            sim.emit_event(SimEvent::Trade {
                ts: sim.now_ns(),
                symbol: self.symbol.clone(),
                price: e.price,
                qty: e.qty,
                maker_agent: e.maker,
                taker_agent: e.taker,
                maker_side: e.maker_side,
            });
            self.reply(
                sim,
                e.taker,
                MessageType::OrderExecuted,
                MessagePayload::OrderExecuted(OrderExecutedPayload {
                    symbol: self.symbol.clone(),
                    price: e.price,
                    qty: e.qty,
                    role: TradeRole::Taker,
                    side_for_recipient: e.maker_side.opposite(),
                    order_id: e.taker_order_id.clone(),
                }),
            );
            self.trades += 1;
        }
    }

    /// Broadcast a depth snapshot to every other agent and mirror it on the
    /// bus. Skipped when net-change-only publication is on and nothing
    /// visible changed.
    fn publish_market_data(&mut self, sim: &mut dyn SimulatorApi) {
        let snapshot = self.book().snapshot(self.md_depth);
        if self.publish_on_net_change_only && self.last_published.as_ref() == Some(&snapshot) {
            return;
        }
        sim.emit_event(SimEvent::MarketData {
            ts: sim.now_ns(),
            symbol: self.symbol.clone(),
            snapshot: snapshot.clone(),
        });
        sim.broadcast_delayed(
            self.id,
            MessageType::MarketData,
            MessagePayload::MarketData(MarketDataPayload {
                symbol: self.symbol.clone(),
                snapshot: snapshot.clone(),
            }),
            self.pipeline_delay_ns,
        );
        self.last_published = Some(snapshot);
    }

    fn handle_limit(&mut self, sim: &mut dyn SimulatorApi, from: AgentId, p: &LimitOrderPayload) {
        let reference = MessagePayload::LimitOrder(p.clone());
        if p.symbol != self.symbol {
            return self.reject(sim, from, "Symbol mismatch", MessageType::LimitOrder, reference);
        }
        if p.price == 0 {
            return self.reject(sim, from, "Invalid price", MessageType::LimitOrder, reference);
        }
        if p.qty == 0 {
            return self.reject(sim, from, "Invalid quantity", MessageType::LimitOrder, reference);
        }

        let order = LimitOrder {
            id: p.id.clone(),
            agent: from,
            symbol: self.symbol.clone(),
            side: p.side,
            price: p.price,
            qty: p.qty,
            ts: sim.now_ns(),
        };
        let placed = self.book().place_limit(order);
        match placed {
            Ok(executions) => {
                self.reply(
                    sim,
                    from,
                    MessageType::OrderAccepted,
                    MessagePayload::OrderAccepted(OrderAcceptedPayload {
                        order_id: p.id.clone(),
                        symbol: Some(self.symbol.clone()),
                        side: Some(p.side),
                        price: Some(p.price),
                        qty: Some(p.qty),
                        replaced: false,
                    }),
                );
                self.dispatch_executions(sim, &executions);
                self.publish_market_data(sim);
            }
            Err(e) => self.reject(sim, from, &e.to_string(), MessageType::LimitOrder, reference),
        }
    }

    fn handle_market(&mut self, sim: &mut dyn SimulatorApi, from: AgentId, p: &MarketOrderPayload) {
        let reference = MessagePayload::MarketOrder(p.clone());
        if p.qty == 0 {
            return self.reject(sim, from, "Invalid quantity", MessageType::MarketOrder, reference);
        }

        let fill = self.book().place_market(from, p.side, p.qty);
        if fill.filled == 0 {
            return self.reject(sim, from, "No liquidity", MessageType::MarketOrder, reference);
        }
        self.dispatch_executions(sim, &fill.executions);
        self.publish_market_data(sim);
    }

    fn handle_cancel(&mut self, sim: &mut dyn SimulatorApi, from: AgentId, p: &CancelOrderPayload) {
        let reference = MessagePayload::CancelOrder(p.clone());
        if p.id.is_empty() {
            return self.reject(sim, from, "Missing order id", MessageType::CancelOrder, reference);
        }
        let cancelled = self.book().cancel(&p.id);
        match cancelled {
            Ok(order) => {
                self.reply(
                    sim,
                    from,
                    MessageType::OrderCancelled,
                    MessagePayload::OrderCancelled(OrderCancelledPayload {
                        order_id: order.id,
                        side: order.side,
                        price: order.price,
                        qty: order.qty,
                    }),
                );
                self.publish_market_data(sim);
            }
            Err(e) => self.reject(sim, from, &e.to_string(), MessageType::CancelOrder, reference),
        }
    }

    fn handle_modify(&mut self, sim: &mut dyn SimulatorApi, from: AgentId, p: &ModifyOrderPayload) {
        let reference = MessagePayload::ModifyOrder(p.clone());
        if p.id.is_empty() {
            return self.reject(sim, from, "Missing order id", MessageType::ModifyOrder, reference);
        }
        if p.price == Some(0) {
            return self.reject(sim, from, "Invalid price", MessageType::ModifyOrder, reference);
        }

        let now = sim.now_ns();
        let modified = self.book().modify(&p.id, p.price, p.qty, now);
        match modified {
            Ok((order, executions)) => {
                self.reply(
                    sim,
                    from,
                    MessageType::OrderAccepted,
                    MessagePayload::OrderAccepted(OrderAcceptedPayload {
                        order_id: order.id,
                        symbol: Some(self.symbol.clone()),
                        side: Some(order.side),
                        price: Some(order.price),
                        qty: Some(order.qty),
                        replaced: true,
                    }),
                );
                self.dispatch_executions(sim, &executions);
                self.publish_market_data(sim);
            }
            Err(e) => self.reject(sim, from, &e.to_string(), MessageType::ModifyOrder, reference),
        }
    }

    fn handle_query_spread(&mut self, sim: &mut dyn SimulatorApi, from: AgentId, depth: usize) {
        let snapshot = self.book().snapshot(depth);
        self.reply(
            sim,
            from,
            MessageType::QuerySpread,
            MessagePayload::MarketData(MarketDataPayload {
                symbol: self.symbol.clone(),
                snapshot,
            }),
        );
    }

    fn handle_query_last(&mut self, sim: &mut dyn SimulatorApi, from: AgentId) {
        let last = self.book().last();
        self.reply(
            sim,
            from,
            MessageType::QueryLast,
            MessagePayload::LastPrice {
                symbol: self.symbol.clone(),
                last,
            },
        );
    }
}

impl Agent for ExchangeAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn on_start(&mut self, _sim: &mut dyn SimulatorApi) {
        info!("[Exchange {}] starting for symbol {}", self.name, self.symbol);
    }

    fn on_stop(&mut self, _sim: &mut dyn SimulatorApi) {
        info!(
            "[Exchange {}] stopping: {} trades, {} rejects, {} resident orders",
            self.name,
            self.trades,
            self.rejects,
            self.book().order_count()
        );
    }

    fn on_message(&mut self, sim: &mut dyn SimulatorApi, msg: &Message) {
        match (&msg.msg_type, &msg.payload) {
            (MessageType::LimitOrder, MessagePayload::LimitOrder(p)) => {
                self.handle_limit(sim, msg.from, p)
            }
            (MessageType::MarketOrder, MessagePayload::MarketOrder(p)) => {
                self.handle_market(sim, msg.from, p)
            }
            (MessageType::CancelOrder, MessagePayload::CancelOrder(p)) => {
                self.handle_cancel(sim, msg.from, p)
            }
            (MessageType::ModifyOrder, MessagePayload::ModifyOrder(p)) => {
                self.handle_modify(sim, msg.from, p)
            }
            (MessageType::QuerySpread, MessagePayload::QuerySpread { depth }) => {
                self.handle_query_spread(sim, msg.from, *depth)
            }
            (MessageType::QueryLast, MessagePayload::QueryLast) => {
                self.handle_query_last(sim, msg.from)
            }
            (MessageType::OracleTick, _) | (MessageType::MarketData, _) => {}
            (kind, _) => {
                warn!(
                    "[Exchange {}] malformed or unexpected {:?} from {}",
                    self.name, kind, msg.from
                );
            }
        }
    }
}
