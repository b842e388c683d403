//! In-process publish-subscribe layer on the kernel.
//!
//! Observers that are not agents (CSV sinks, gateways, renderers) subscribe
//! here. Emission is synchronous and single-threaded; listeners must not
//! block and must not call back into the kernel.

use serde::Serialize;

use crate::messages::{AgentId, MessageType, Side};
use crate::order_book::L2Snapshot;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SimEvent {
    /// One per match produced by the book.
    Trade {
        ts: u64,
        symbol: String,
        price: u64,
        qty: u64,
        maker_agent: AgentId,
        taker_agent: AgentId,
        maker_side: Side,
    },

    /// Order-mutating message handed to the kernel, recorded at send time,
    /// before any delivery.
    OrderLog {
        ts: u64,
        from: AgentId,
        to: AgentId,
        msg_type: MessageType,
        symbol: Option<String>,
        side: Option<Side>,
        price: Option<u64>,
        qty: Option<u64>,
        order_id: Option<String>,
    },

    /// Validation or liquidity failure surfaced by the exchange.
    OrderRejected {
        ts: u64,
        agent: AgentId,
        reason: String,
        ref_type: MessageType,
    },

    /// Depth snapshot published by the exchange.
    MarketData {
        ts: u64,
        symbol: String,
        snapshot: L2Snapshot,
    },

    /// Fundamental-value update from an oracle.
    OracleTick {
        ts: u64,
        symbol: String,
        fundamental: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Trade,
    OrderLog,
    OrderRejected,
    MarketData,
    OracleTick,
}

impl SimEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SimEvent::Trade { .. } => EventKind::Trade,
            SimEvent::OrderLog { .. } => EventKind::OrderLog,
            SimEvent::OrderRejected { .. } => EventKind::OrderRejected,
            SimEvent::MarketData { .. } => EventKind::MarketData,
            SimEvent::OracleTick { .. } => EventKind::OracleTick,
        }
    }
}

pub trait EventListener {
    fn on_event(&mut self, event: &SimEvent);
}

/// Token returned by `subscribe`; pass back to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberId(u64);

struct Subscription {
    id: SubscriberId,
    filter: Option<EventKind>,
    listener: Box<dyn EventListener>,
}

pub struct EventBus {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
            next_id: 0,
        }
    }

    /// Subscribe a listener to one event kind.
    pub fn subscribe(&mut self, kind: EventKind, listener: Box<dyn EventListener>) -> SubscriberId {
        self.add(Some(kind), listener)
    }

    /// Subscribe a listener to every event kind.
    pub fn subscribe_all(&mut self, listener: Box<dyn EventListener>) -> SubscriberId {
        self.add(None, listener)
    }

    fn add(&mut self, filter: Option<EventKind>, listener: Box<dyn EventListener>) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription {
            id,
            filter,
            listener,
        });
        id
    }

    /// Remove a subscription; returns false if the token is unknown.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    /// Deliver an event to every matching listener, in subscription order.
    pub fn emit(&mut self, event: SimEvent) {
        let kind = event.kind();
        for sub in self.subscriptions.iter_mut() {
            if sub.filter.map_or(true, |f| f == kind) {
                sub.listener.on_event(&event);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.subscriptions.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        seen: Rc<RefCell<Vec<EventKind>>>,
    }

    impl EventListener for Recorder {
        fn on_event(&mut self, event: &SimEvent) {
            self.seen.borrow_mut().push(event.kind());
        }
    }

    fn trade_event() -> SimEvent {
        SimEvent::Trade {
            ts: 1,
            symbol: "ACME".into(),
            price: 100,
            qty: 1,
            maker_agent: 2,
            taker_agent: 3,
            maker_side: Side::Sell,
        }
    }

    fn oracle_event() -> SimEvent {
        SimEvent::OracleTick {
            ts: 1,
            symbol: "ACME".into(),
            fundamental: 100,
        }
    }

    #[test]
    fn filtered_subscription_only_sees_its_kind() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.subscribe(EventKind::Trade, Box::new(Recorder { seen: seen.clone() }));

        bus.emit(oracle_event());
        bus.emit(trade_event());

        assert_eq!(&*seen.borrow(), &[EventKind::Trade]);
    }

    #[test]
    fn subscribe_all_sees_everything() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.subscribe_all(Box::new(Recorder { seen: seen.clone() }));

        bus.emit(oracle_event());
        bus.emit(trade_event());

        assert_eq!(&*seen.borrow(), &[EventKind::OracleTick, EventKind::Trade]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        let id = bus.subscribe_all(Box::new(Recorder { seen: seen.clone() }));

        bus.emit(trade_event());
        assert!(bus.unsubscribe(id));
        bus.emit(trade_event());

        assert_eq!(seen.borrow().len(), 1);
        assert!(!bus.unsubscribe(id));
    }
}
