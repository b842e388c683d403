use serde::{Deserialize, Serialize};

use crate::events::SimEvent;
use crate::order_book::L2Snapshot;

pub type AgentId = u32;

/// Reserved sender id for kernel-generated wakeup messages.
pub const WAKEUP_SENDER: AgentId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Wakeup,
    LimitOrder,
    MarketOrder,
    CancelOrder,
    ModifyOrder,
    QuerySpread,
    QueryLast,
    MarketData,
    OracleTick,
    OrderAccepted,
    OrderExecuted,
    OrderCancelled,
    OrderRejected,
}

impl MessageType {
    /// True for the message kinds that mutate the order book.
    pub fn is_order_mutation(self) -> bool {
        matches!(
            self,
            MessageType::LimitOrder
                | MessageType::MarketOrder
                | MessageType::CancelOrder
                | MessageType::ModifyOrder
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Role of a counterparty in an execution: the aggressor whose arriving
/// order caused the trade, or the resting order it matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeRole {
    Maker,
    Taker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitOrderPayload {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    /// Limit price in cents.
    pub price: u64,
    pub qty: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketOrderPayload {
    pub side: Side,
    pub qty: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrderPayload {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifyOrderPayload {
    pub id: String,
    pub price: Option<u64>,
    pub qty: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAcceptedPayload {
    pub order_id: String,
    pub symbol: Option<String>,
    pub side: Option<Side>,
    pub price: Option<u64>,
    pub qty: Option<u64>,
    /// Set when the accept answers a MODIFY_ORDER.
    pub replaced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderExecutedPayload {
    pub symbol: String,
    pub price: u64,
    pub qty: u64,
    pub role: TradeRole,
    /// Side of the execution from the recipient's viewpoint, i.e. the side
    /// of the order they placed.
    pub side_for_recipient: Side,
    /// Resting order id for makers, the taker's own order id for limit
    /// takers; absent for market-order takers.
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledPayload {
    pub order_id: String,
    pub side: Side,
    pub price: u64,
    pub qty: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRejectedPayload {
    pub reason: String,
    pub ref_type: MessageType,
    /// The offending request payload, echoed back to the sender.
    pub reference: Box<MessagePayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataPayload {
    pub symbol: String,
    pub snapshot: L2Snapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleTickPayload {
    pub symbol: String,
    /// Fundamental value in cents.
    pub fundamental: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MessagePayload {
    Empty,
    LimitOrder(LimitOrderPayload),
    MarketOrder(MarketOrderPayload),
    CancelOrder(CancelOrderPayload),
    ModifyOrder(ModifyOrderPayload),
    /// Request: snapshot depth. The reply reuses `MessageType::QuerySpread`
    /// with a `MarketData` payload.
    QuerySpread {
        depth: usize,
    },
    QueryLast,
    LastPrice {
        symbol: String,
        last: Option<u64>,
    },
    OrderAccepted(OrderAcceptedPayload),
    OrderExecuted(OrderExecutedPayload),
    OrderCancelled(OrderCancelledPayload),
    OrderRejected(OrderRejectedPayload),
    MarketData(MarketDataPayload),
    OracleTick(OracleTickPayload),
}

/// Core message type that flows through the kernel.
///
/// `at` is the virtual delivery time in nanoseconds; it is stamped once by
/// the kernel when the message is scheduled and never changes afterwards.
#[derive(Debug, Clone)]
pub struct Message {
    pub to: AgentId,
    pub from: AgentId,
    pub msg_type: MessageType,
    pub at: u64,
    pub payload: MessagePayload,
}

impl Message {
    pub fn new(
        to: AgentId,
        from: AgentId,
        msg_type: MessageType,
        at: u64,
        payload: MessagePayload,
    ) -> Self {
        Self {
            to,
            from,
            msg_type,
            at,
            payload,
        }
    }

    /// Helper constructor for a message with empty payload.
    pub fn new_empty(to: AgentId, from: AgentId, msg_type: MessageType, at: u64) -> Self {
        Self::new(to, from, msg_type, at, MessagePayload::Empty)
    }
}

/// Minimal interface that the kernel exposes to agents.
pub trait SimulatorApi {
    /// Return current simulation time in nanoseconds. Inside a delivery
    /// handler this is the delivered message's `at`; between deliveries it
    /// is the tick horizon.
    fn now_ns(&self) -> u64;

    /// Id of the agent designated as the exchange.
    fn exchange_id(&self) -> AgentId;

    /// Send a message from one agent to another through the latency model.
    fn send(&mut self, from: AgentId, to: AgentId, kind: MessageType, payload: MessagePayload) {
        self.send_delayed(from, to, kind, payload, 0);
    }

    /// Like `send`, with an additional fixed delay on top of the latency
    /// model's network and compute components.
    fn send_delayed(
        &mut self,
        from: AgentId,
        to: AgentId,
        kind: MessageType,
        payload: MessagePayload,
        extra_delay_ns: u64,
    );

    /// Schedule a wakeup for a specific agent at the given simulation time.
    /// Wakeups bypass the latency model.
    fn wakeup(&mut self, agent_id: AgentId, at_ns: u64);

    /// Broadcast a message from one agent to every other agent, each copy
    /// stamped with its own latency.
    fn broadcast(&mut self, from: AgentId, kind: MessageType, payload: MessagePayload) {
        self.broadcast_delayed(from, kind, payload, 0);
    }

    fn broadcast_delayed(
        &mut self,
        from: AgentId,
        kind: MessageType,
        payload: MessagePayload,
        extra_delay_ns: u64,
    );

    /// Publish an event on the kernel's event bus.
    fn emit_event(&mut self, event: SimEvent);
}
