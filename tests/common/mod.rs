//! Shared helpers for integration tests: a scripted trader that fires
//! pre-planned messages at fixed virtual times, and a bus recorder.

use std::cell::RefCell;
use std::rc::Rc;

use lobsim::agents::Agent;
use lobsim::events::{EventListener, SimEvent};
use lobsim::messages::{AgentId, Message, MessagePayload, MessageType, SimulatorApi};

/// One pre-planned outbound message.
pub struct ScriptedSend {
    pub at_ns: u64,
    pub kind: MessageType,
    pub payload: MessagePayload,
}

/// A message as seen by a recipient: (kind, delivery time, payload).
pub type ReceivedLog = Rc<RefCell<Vec<(MessageType, u64, MessagePayload)>>>;

/// Trader that sends scripted messages to the exchange and records
/// everything it receives.
pub struct ScriptedTrader {
    id: AgentId,
    name: String,
    script: Vec<ScriptedSend>,
    pub received: ReceivedLog,
}

impl ScriptedTrader {
    pub fn new(id: AgentId, script: Vec<ScriptedSend>) -> (Box<Self>, ReceivedLog) {
        let received: ReceivedLog = Rc::new(RefCell::new(Vec::new()));
        let trader = Box::new(Self {
            id,
            name: format!("scripted-{id}"),
            script,
            received: received.clone(),
        });
        let log = trader.received.clone();
        (trader, log)
    }
}

impl Agent for ScriptedTrader {
    fn id(&self) -> AgentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn on_start(&mut self, sim: &mut dyn SimulatorApi) {
        for send in &self.script {
            sim.wakeup(self.id, send.at_ns);
        }
    }

    fn on_wakeup(&mut self, sim: &mut dyn SimulatorApi, now_ns: u64) {
        let exchange = sim.exchange_id();
        let script = std::mem::take(&mut self.script);
        let (due, rest): (Vec<_>, Vec<_>) = script.into_iter().partition(|s| s.at_ns <= now_ns);
        self.script = rest;
        for send in due {
            sim.send(self.id, exchange, send.kind, send.payload);
        }
    }

    fn on_message(&mut self, _sim: &mut dyn SimulatorApi, msg: &Message) {
        self.received
            .borrow_mut()
            .push((msg.msg_type, msg.at, msg.payload.clone()));
    }
}

/// Bus listener that records every event it sees.
pub struct BusRecorder {
    pub events: Rc<RefCell<Vec<SimEvent>>>,
}

impl BusRecorder {
    pub fn new() -> (Box<Self>, Rc<RefCell<Vec<SimEvent>>>) {
        let events = Rc::new(RefCell::new(Vec::new()));
        (
            Box::new(Self {
                events: events.clone(),
            }),
            events,
        )
    }
}

impl EventListener for BusRecorder {
    fn on_event(&mut self, event: &SimEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}
