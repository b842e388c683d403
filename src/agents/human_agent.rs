//! Human trader bridge: receives commands from the gateway over a channel
//! and executes them in the simulation.
//!
//! The gateway threads never touch the kernel; commands queue up here and
//! are drained on the tick thread at each wake, which keeps all kernel
//! interaction serialized.

use std::collections::BTreeMap;

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::agents::Agent;
use crate::messages::{
    AgentId, CancelOrderPayload, LimitOrderPayload, MarketOrderPayload, Message, MessagePayload,
    MessageType, ModifyOrderPayload, Side, SimulatorApi,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HumanCommand {
    PlaceLimit { side: Side, price: u64, qty: u64 },
    PlaceMarket { side: Side, qty: u64 },
    Cancel { id: String },
    Modify { id: String, price: Option<u64>, qty: Option<u64> },
    ListOpen,
    Balances,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl HumanResponse {
    fn ok(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct OpenOrder {
    side: Side,
    price: u64,
    qty: u64,
}

pub struct HumanAgent {
    id: AgentId,
    name: String,
    symbol: String,
    command_rx: Receiver<HumanCommand>,
    response_tx: Sender<HumanResponse>,
    wake_interval_ns: u64,

    /// Cash in cents; goes negative when buying on margin.
    cash: i64,
    /// Signed inventory.
    position: i64,
    open_orders: BTreeMap<String, OpenOrder>,
    next_order_seq: u64,
}

impl HumanAgent {
    pub fn new(
        id: AgentId,
        name: String,
        symbol: String,
        command_rx: Receiver<HumanCommand>,
        response_tx: Sender<HumanResponse>,
        wake_interval_ms: u64,
        starting_cash: i64,
    ) -> Self {
        Self {
            id,
            name,
            symbol,
            command_rx,
            response_tx,
            wake_interval_ns: wake_interval_ms * 1_000_000,
            cash: starting_cash,
            position: 0,
            open_orders: BTreeMap::new(),
            next_order_seq: 0,
        }
    }

    fn next_order_id(&mut self) -> String {
        self.next_order_seq += 1;
        format!("h{}-{}", self.id, self.next_order_seq)
    }

    fn process_commands(&mut self, sim: &mut dyn SimulatorApi) {
        while let Ok(cmd) = self.command_rx.try_recv() {
            debug!("[{}] cmd: {:?}", self.name, cmd);
            let response = match cmd {
                HumanCommand::PlaceLimit { side, price, qty } => {
                    self.handle_place_limit(sim, side, price, qty)
                }
                HumanCommand::PlaceMarket { side, qty } => self.handle_place_market(sim, side, qty),
                HumanCommand::Cancel { id } => self.handle_cancel(sim, id),
                HumanCommand::Modify { id, price, qty } => self.handle_modify(sim, id, price, qty),
                HumanCommand::ListOpen => self.handle_list_open(),
                HumanCommand::Balances => self.handle_balances(),
            };
            let _ = self.response_tx.send(response);
        }
    }

    fn handle_place_limit(
        &mut self,
        sim: &mut dyn SimulatorApi,
        side: Side,
        price: u64,
        qty: u64,
    ) -> HumanResponse {
        if price == 0 || qty == 0 {
            return HumanResponse::err("price and qty must be positive");
        }
        let id = self.next_order_id();
        self.open_orders
            .insert(id.clone(), OpenOrder { side, price, qty });
        let exchange = sim.exchange_id();
        sim.send(
            self.id,
            exchange,
            MessageType::LimitOrder,
            MessagePayload::LimitOrder(LimitOrderPayload {
                id: id.clone(),
                symbol: self.symbol.clone(),
                side,
                price,
                qty,
            }),
        );
        HumanResponse::ok(
            format!("limit submitted: {:?} {} @ {}", side, qty, price),
            Some(json!({ "order_id": id })),
        )
    }

    fn handle_place_market(
        &mut self,
        sim: &mut dyn SimulatorApi,
        side: Side,
        qty: u64,
    ) -> HumanResponse {
        if qty == 0 {
            return HumanResponse::err("qty must be positive");
        }
        let exchange = sim.exchange_id();
        sim.send(
            self.id,
            exchange,
            MessageType::MarketOrder,
            MessagePayload::MarketOrder(MarketOrderPayload { side, qty }),
        );
        HumanResponse::ok(format!("market submitted: {:?} {}", side, qty), None)
    }

    fn handle_cancel(&mut self, sim: &mut dyn SimulatorApi, id: String) -> HumanResponse {
        if !self.open_orders.contains_key(&id) {
            return HumanResponse::err(format!("no open order {id}"));
        }
        let exchange = sim.exchange_id();
        sim.send(
            self.id,
            exchange,
            MessageType::CancelOrder,
            MessagePayload::CancelOrder(CancelOrderPayload { id: id.clone() }),
        );
        HumanResponse::ok(format!("cancel submitted: {id}"), None)
    }

    fn handle_modify(
        &mut self,
        sim: &mut dyn SimulatorApi,
        id: String,
        price: Option<u64>,
        qty: Option<u64>,
    ) -> HumanResponse {
        if !self.open_orders.contains_key(&id) {
            return HumanResponse::err(format!("no open order {id}"));
        }
        let exchange = sim.exchange_id();
        sim.send(
            self.id,
            exchange,
            MessageType::ModifyOrder,
            MessagePayload::ModifyOrder(ModifyOrderPayload {
                id: id.clone(),
                price,
                qty,
            }),
        );
        HumanResponse::ok(format!("modify submitted: {id}"), None)
    }

    fn handle_list_open(&self) -> HumanResponse {
        let orders: Vec<_> = self
            .open_orders
            .iter()
            .map(|(id, o)| json!({ "id": id, "side": o.side, "price": o.price, "qty": o.qty }))
            .collect();
        HumanResponse::ok(
            format!("{} open orders", orders.len()),
            Some(json!({ "orders": orders })),
        )
    }

    fn handle_balances(&self) -> HumanResponse {
        HumanResponse::ok(
            "balances",
            Some(json!({ "cash": self.cash, "position": self.position })),
        )
    }
}

impl Agent for HumanAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn on_start(&mut self, sim: &mut dyn SimulatorApi) {
        info!("[{}] started, waiting for gateway commands", self.name);
        sim.wakeup(self.id, sim.now_ns() + self.wake_interval_ns);
    }

    fn on_wakeup(&mut self, sim: &mut dyn SimulatorApi, now_ns: u64) {
        self.process_commands(sim);
        sim.wakeup(self.id, now_ns + self.wake_interval_ns);
    }

    fn on_message(&mut self, _sim: &mut dyn SimulatorApi, msg: &Message) {
        match (&msg.msg_type, &msg.payload) {
            (MessageType::OrderExecuted, MessagePayload::OrderExecuted(p)) => {
                let notional = (p.price * p.qty) as i64;
                match p.side_for_recipient {
                    Side::Buy => {
                        self.cash -= notional;
                        self.position += p.qty as i64;
                    }
                    Side::Sell => {
                        self.cash += notional;
                        self.position -= p.qty as i64;
                    }
                }
                if let Some(id) = &p.order_id {
                    if let Some(o) = self.open_orders.get_mut(id) {
                        o.qty = o.qty.saturating_sub(p.qty);
                        if o.qty == 0 {
                            self.open_orders.remove(id);
                        }
                    }
                }
                info!(
                    "[{}] fill {:?} {} @ {} (cash={}, position={})",
                    self.name, p.side_for_recipient, p.qty, p.price, self.cash, self.position
                );
            }
            (MessageType::OrderCancelled, MessagePayload::OrderCancelled(p)) => {
                self.open_orders.remove(&p.order_id);
            }
            (MessageType::OrderAccepted, MessagePayload::OrderAccepted(p)) => {
                if p.replaced {
                    if let Some(o) = self.open_orders.get_mut(&p.order_id) {
                        if let Some(price) = p.price {
                            o.price = price;
                        }
                        if let Some(qty) = p.qty {
                            o.qty = qty;
                        }
                    }
                    if p.qty == Some(0) {
                        self.open_orders.remove(&p.order_id);
                    }
                }
            }
            (MessageType::OrderRejected, MessagePayload::OrderRejected(p)) => {
                if let MessagePayload::LimitOrder(o) = p.reference.as_ref() {
                    self.open_orders.remove(&o.id);
                }
                info!("[{}] rejected: {}", self.name, p.reason);
            }
            _ => {}
        }
    }

    fn on_stop(&mut self, _sim: &mut dyn SimulatorApi) {
        info!(
            "[{}] stopping: cash={} position={} open={}",
            self.name,
            self.cash,
            self.position,
            self.open_orders.len()
        );
    }
}
