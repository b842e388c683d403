//! Simulation kernel.
//!
//! Owns the agents, virtual time, the time-priority queue, the latency
//! model, the exchange identity and the event bus. One tick advances the
//! clock by a fixed increment and delivers every message that has come due;
//! all agent handlers run to completion on this thread.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::agents::Agent;
use crate::events::{EventBus, SimEvent};
use crate::latency::LatencyModel;
use crate::messages::{
    AgentId, Message, MessagePayload, MessageType, SimulatorApi, WAKEUP_SENDER,
};
use crate::order_book::OrderBook;
use crate::queue::TimeQueue;

pub struct Kernel {
    /// Virtual now: the `at` of the message being delivered, or the tick
    /// horizon between deliveries.
    time_ns: u64,
    /// End of the current tick window.
    horizon_ns: u64,
    tick_ns: u64,
    latency: Option<Box<dyn LatencyModel>>,
    queue: TimeQueue,
    agents: Vec<Box<dyn Agent>>,
    /// O(1) lookup: AgentId -> index in agents vec.
    agent_index: HashMap<AgentId, usize>,
    exchange_id: AgentId,
    event_bus: EventBus,
    /// Shared handle to the exchange's book for external snapshot readers.
    book: Option<Arc<Mutex<OrderBook>>>,
    post_tick: Option<Box<dyn FnMut(u64)>>,
    /// If Some, `run` paces ticks against the wall clock with this delay.
    realtime_tick_ms: Option<u64>,
    started: bool,
}

impl Kernel {
    /// A missing latency model means zero latency everywhere.
    pub fn new(latency: Option<Box<dyn LatencyModel>>, tick_ns: u64) -> Self {
        Self {
            time_ns: 0,
            horizon_ns: 0,
            tick_ns,
            latency,
            queue: TimeQueue::new(),
            agents: Vec::new(),
            agent_index: HashMap::new(),
            exchange_id: 0,
            event_bus: EventBus::new(),
            book: None,
            post_tick: None,
            realtime_tick_ms: None,
            started: false,
        }
    }

    /// Enable wall-clock pacing: each tick takes at least `tick_ms` of real
    /// time, letting external interaction flow in between ticks.
    pub fn set_realtime(&mut self, tick_ms: u64) {
        self.realtime_tick_ms = Some(tick_ms);
        info!("[Kernel] realtime mode enabled: {}ms per tick", tick_ms);
    }

    /// Designate the exchange agent; its id is advertised to all agents.
    pub fn set_exchange(&mut self, id: AgentId) {
        self.exchange_id = id;
    }

    pub fn event_bus_mut(&mut self) -> &mut EventBus {
        &mut self.event_bus
    }

    /// Share the exchange's book for read-only snapshot access from
    /// external threads. Callers lock briefly, copy, and release.
    pub fn register_book(&mut self, book: Arc<Mutex<OrderBook>>) {
        self.book = Some(book);
    }

    pub fn book(&self) -> Option<Arc<Mutex<OrderBook>>> {
        self.book.clone()
    }

    /// Hook invoked once at the end of every tick with the tick horizon.
    pub fn set_post_tick_observer(&mut self, observer: Box<dyn FnMut(u64)>) {
        self.post_tick = Some(observer);
    }

    /// Register an agent and let it attach.
    pub fn add_agent(&mut self, mut agent: Box<dyn Agent>) {
        let id = agent.id();
        info!("[Kernel] registering agent {} (id={})", agent.name(), id);
        agent.on_attach(self);
        let idx = self.agents.len();
        self.agents.push(agent);
        self.agent_index.insert(id, idx);
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn queued_messages(&self) -> usize {
        self.queue.len()
    }

    /// Set the clock and invoke every agent's start hook.
    pub fn start(&mut self, start_ns: u64) {
        self.time_ns = start_ns;
        self.horizon_ns = start_ns;
        info!(
            "[Kernel] starting simulation with {} agents at t={} ns, tick_ns={}",
            self.agents.len(),
            start_ns,
            self.tick_ns
        );
        for idx in 0..self.agents.len() {
            self.with_detached_agent(idx, |agent, sim| agent.on_start(sim));
        }
        self.started = true;
    }

    /// Halt the simulation: discard queued messages and notify agents.
    pub fn stop(&mut self) {
        self.queue.clear();
        for idx in 0..self.agents.len() {
            self.with_detached_agent(idx, |agent, sim| agent.on_stop(sim));
        }
        self.started = false;
        info!("[Kernel] simulation stopped at {} ns", self.time_ns);
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// One tick: advance the horizon, deliver everything due, then invoke
    /// the post-tick observer.
    pub fn tick(&mut self) {
        self.horizon_ns = self.horizon_ns.saturating_add(self.tick_ns);

        while let Some(next_at) = self.queue.peek_at() {
            if next_at > self.horizon_ns {
                break;
            }
            let msg = match self.queue.pop() {
                Some(m) => m,
                None => break,
            };
            // Handlers observe the message's own delivery time; the heap
            // pops in nondecreasing `at`, so this never moves backwards.
            self.time_ns = self.time_ns.max(msg.at);
            self.dispatch(msg);
        }

        self.time_ns = self.horizon_ns;
        let horizon = self.horizon_ns;
        if let Some(observer) = self.post_tick.as_mut() {
            observer(horizon);
        }
    }

    /// Drive the simulation for at most `max_steps` ticks, stopping early
    /// when the queue drains. Wall-paced when realtime mode is on.
    pub fn run(&mut self, max_steps: usize) {
        for step in 0..max_steps {
            let tick_start = Instant::now();
            self.tick();

            if self.queue.is_empty() {
                debug!(
                    "[Kernel] queue is empty, stopping early after {} ticks",
                    step + 1
                );
                break;
            }

            if let Some(tick_ms) = self.realtime_tick_ms {
                let elapsed = tick_start.elapsed();
                let target = Duration::from_millis(tick_ms);
                if elapsed < target {
                    std::thread::sleep(target - elapsed);
                }
            }
        }
    }

    fn dispatch(&mut self, msg: Message) {
        let target = msg.to;
        let now = self.time_ns;
        let Some(idx) = self.agent_index.get(&target).copied() else {
            debug!(
                "[Kernel] message for unknown agent id={} dropped: {:?}",
                target, msg.msg_type
            );
            return;
        };
        self.with_detached_agent(idx, |agent, sim| match msg.msg_type {
            MessageType::Wakeup => agent.on_wakeup(sim, now),
            _ => agent.on_message(sim, &msg),
        });
    }

    /// Temporarily move an agent out of the vector so the kernel can be
    /// passed as `&mut dyn SimulatorApi` without aliasing the agent.
    fn with_detached_agent<F>(&mut self, idx: usize, f: F)
    where
        F: FnOnce(&mut Box<dyn Agent>, &mut dyn SimulatorApi),
    {
        let mut agent = self.agents.remove(idx);
        f(&mut agent, self);
        self.agents.insert(idx, agent);
    }

    /// ORDER_LOG bus events are emitted synchronously at send time, before
    /// any delivery.
    fn log_order_mutation(&mut self, from: AgentId, to: AgentId, kind: MessageType, payload: &MessagePayload) {
        let (symbol, side, price, qty, order_id) = match payload {
            MessagePayload::LimitOrder(p) => (
                Some(p.symbol.clone()),
                Some(p.side),
                Some(p.price),
                Some(p.qty),
                Some(p.id.clone()),
            ),
            MessagePayload::MarketOrder(p) => (None, Some(p.side), None, Some(p.qty), None),
            MessagePayload::CancelOrder(p) => (None, None, None, None, Some(p.id.clone())),
            MessagePayload::ModifyOrder(p) => (None, None, p.price, p.qty, Some(p.id.clone())),
            _ => (None, None, None, None, None),
        };
        let ev = SimEvent::OrderLog {
            ts: self.time_ns,
            from,
            to,
            msg_type: kind,
            symbol,
            side,
            price,
            qty,
            order_id,
        };
        self.event_bus.emit(ev);
    }

    fn delays_for(&mut self, from: AgentId, to: AgentId) -> u64 {
        let Some(model) = self.latency.as_mut() else {
            return 0;
        };
        let network = model.delay_ns(from, to);
        // Compute delay applies only on the way into the exchange.
        let compute = if to == self.exchange_id && from != self.exchange_id {
            model.compute_ns(to)
        } else {
            0
        };
        network.saturating_add(compute)
    }
}

impl SimulatorApi for Kernel {
    fn now_ns(&self) -> u64 {
        self.time_ns
    }

    fn exchange_id(&self) -> AgentId {
        self.exchange_id
    }

    fn send_delayed(
        &mut self,
        from: AgentId,
        to: AgentId,
        kind: MessageType,
        payload: MessagePayload,
        extra_delay_ns: u64,
    ) {
        let delay = self.delays_for(from, to);
        let at = self
            .time_ns
            .saturating_add(delay)
            .saturating_add(extra_delay_ns);

        if kind.is_order_mutation() {
            self.log_order_mutation(from, to, kind, &payload);
        }
        if let MessagePayload::OracleTick(p) = &payload {
            self.event_bus.emit(SimEvent::OracleTick {
                ts: self.time_ns,
                symbol: p.symbol.clone(),
                fundamental: p.fundamental,
            });
        }

        self.queue.push(Message::new(to, from, kind, at, payload));
    }

    fn wakeup(&mut self, agent_id: AgentId, at_ns: u64) {
        self.queue.push(Message::new_empty(
            agent_id,
            WAKEUP_SENDER,
            MessageType::Wakeup,
            at_ns,
        ));
    }

    fn broadcast_delayed(
        &mut self,
        from: AgentId,
        kind: MessageType,
        payload: MessagePayload,
        extra_delay_ns: u64,
    ) {
        // Oracle ticks hit the bus once per broadcast, not per recipient.
        if let MessagePayload::OracleTick(p) = &payload {
            self.event_bus.emit(SimEvent::OracleTick {
                ts: self.time_ns,
                symbol: p.symbol.clone(),
                fundamental: p.fundamental,
            });
        }

        let recipients: Vec<AgentId> = self
            .agents
            .iter()
            .map(|a| a.id())
            .filter(|id| *id != from)
            .collect();
        for to in recipients {
            let delay = self.delays_for(from, to);
            let at = self
                .time_ns
                .saturating_add(delay)
                .saturating_add(extra_delay_ns);
            self.queue
                .push(Message::new(to, from, kind, at, payload.clone()));
        }
    }

    fn emit_event(&mut self, event: SimEvent) {
        self.event_bus.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::latency::FixedLatency;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Trace {
        wakes: Vec<(AgentId, u64)>,
        received: Vec<(AgentId, MessageType, u64)>,
    }

    struct Probe {
        id: AgentId,
        name: String,
        trace: Rc<RefCell<Trace>>,
    }

    impl Probe {
        fn new(id: AgentId, trace: Rc<RefCell<Trace>>) -> Box<Self> {
            Box::new(Self {
                id,
                name: format!("probe-{id}"),
                trace,
            })
        }
    }

    impl Agent for Probe {
        fn id(&self) -> AgentId {
            self.id
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn on_wakeup(&mut self, _sim: &mut dyn SimulatorApi, now_ns: u64) {
            self.trace.borrow_mut().wakes.push((self.id, now_ns));
        }

        fn on_message(&mut self, _sim: &mut dyn SimulatorApi, msg: &Message) {
            self.trace
                .borrow_mut()
                .received
                .push((self.id, msg.msg_type, msg.at));
        }
    }

    fn kernel_with_probes(n: u32, trace: &Rc<RefCell<Trace>>) -> Kernel {
        let mut kernel = Kernel::new(None, 200_000_000);
        for id in 1..=n {
            kernel.add_agent(Probe::new(id, trace.clone()));
        }
        kernel
    }

    #[test]
    fn clock_advances_by_tick_increment() {
        let trace = Rc::new(RefCell::new(Trace::default()));
        let mut kernel = kernel_with_probes(1, &trace);
        kernel.start(0);
        assert_eq!(kernel.now_ns(), 0);
        kernel.tick();
        assert_eq!(kernel.now_ns(), 200_000_000);
        kernel.tick();
        assert_eq!(kernel.now_ns(), 400_000_000);
    }

    #[test]
    fn wakeups_deliver_fifo_among_equal_times() {
        let trace = Rc::new(RefCell::new(Trace::default()));
        let mut kernel = kernel_with_probes(3, &trace);
        kernel.start(0);
        kernel.wakeup(1, 1000);
        kernel.wakeup(2, 1000);
        kernel.wakeup(3, 2000);
        kernel.tick();

        let wakes = &trace.borrow().wakes;
        assert_eq!(wakes[0].0, 1);
        assert_eq!(wakes[1].0, 2);
        assert_eq!(wakes[2].0, 3);
    }

    #[test]
    fn handler_observes_delivery_time_not_horizon() {
        let trace = Rc::new(RefCell::new(Trace::default()));
        let mut kernel = kernel_with_probes(1, &trace);
        kernel.start(0);
        kernel.wakeup(1, 50_000_000);
        kernel.tick();
        assert_eq!(trace.borrow().wakes, vec![(1, 50_000_000)]);
        // Between ticks, now is the horizon again.
        assert_eq!(kernel.now_ns(), 200_000_000);
    }

    #[test]
    fn unknown_recipient_is_dropped() {
        let trace = Rc::new(RefCell::new(Trace::default()));
        let mut kernel = kernel_with_probes(1, &trace);
        kernel.start(0);
        kernel.send(1, 99, MessageType::QueryLast, MessagePayload::QueryLast);
        kernel.tick();
        assert!(trace.borrow().received.is_empty());
    }

    #[test]
    fn send_applies_network_and_compute_latency_toward_exchange() {
        let trace = Rc::new(RefCell::new(Trace::default()));
        let mut kernel = Kernel::new(
            Some(Box::new(FixedLatency::new(100_000_000, 40_000_000))),
            200_000_000,
        );
        kernel.add_agent(Probe::new(1, trace.clone()));
        kernel.add_agent(Probe::new(2, trace.clone()));
        kernel.set_exchange(1);
        kernel.start(0);

        // Toward the exchange: network + compute.
        kernel.send(2, 1, MessageType::QueryLast, MessagePayload::QueryLast);
        // Away from the exchange: network only.
        kernel.send(1, 2, MessageType::QueryLast, MessagePayload::QueryLast);
        kernel.tick();

        let received = &trace.borrow().received;
        assert_eq!(received.len(), 2);
        assert!(received.contains(&(1, MessageType::QueryLast, 140_000_000)));
        assert!(received.contains(&(2, MessageType::QueryLast, 100_000_000)));
    }

    #[test]
    fn extra_delay_shifts_delivery() {
        let trace = Rc::new(RefCell::new(Trace::default()));
        let mut kernel = kernel_with_probes(2, &trace);
        kernel.start(0);
        kernel.send_delayed(
            1,
            2,
            MessageType::QueryLast,
            MessagePayload::QueryLast,
            250_000_000,
        );
        kernel.tick();
        assert!(trace.borrow().received.is_empty());
        kernel.tick();
        assert_eq!(trace.borrow().received, vec![(2, MessageType::QueryLast, 250_000_000)]);
    }

    #[test]
    fn broadcast_skips_sender() {
        let trace = Rc::new(RefCell::new(Trace::default()));
        let mut kernel = kernel_with_probes(3, &trace);
        kernel.start(0);
        kernel.broadcast(
            2,
            MessageType::OracleTick,
            MessagePayload::OracleTick(crate::messages::OracleTickPayload {
                symbol: "ACME".into(),
                fundamental: 10_000,
            }),
        );
        kernel.tick();

        let received = &trace.borrow().received;
        let targets: Vec<AgentId> = received.iter().map(|(id, _, _)| *id).collect();
        assert_eq!(targets, vec![1, 3]);
    }

    #[test]
    fn stop_discards_queued_messages() {
        let trace = Rc::new(RefCell::new(Trace::default()));
        let mut kernel = kernel_with_probes(1, &trace);
        kernel.start(0);
        kernel.wakeup(1, 100);
        kernel.stop();
        assert_eq!(kernel.queued_messages(), 0);
        kernel.tick();
        assert!(trace.borrow().wakes.is_empty());
    }

    #[test]
    fn post_tick_observer_runs_once_per_tick() {
        let trace = Rc::new(RefCell::new(Trace::default()));
        let mut kernel = kernel_with_probes(1, &trace);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_inner = seen.clone();
        kernel.set_post_tick_observer(Box::new(move |t| seen_inner.borrow_mut().push(t)));
        kernel.start(0);
        kernel.tick();
        kernel.tick();
        assert_eq!(&*seen.borrow(), &[200_000_000, 400_000_000]);
    }
}
